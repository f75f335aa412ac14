//! openEHR terminology constants used for RM defaults

/// openEHR terminology id
pub const OPENEHR: &str = "openehr";
/// Terminology of composition and entry languages
pub const LANGUAGE_TERMINOLOGY: &str = "ISO_639-1";
/// Terminology of composition territories
pub const TERRITORY_TERMINOLOGY: &str = "ISO_3166-1";
/// Terminology of entry encodings
pub const ENCODING_TERMINOLOGY: &str = "IANA_character-sets";
/// Terminology of multimedia types
pub const MEDIA_TERMINOLOGY: &str = "IANA_media-types";

/// Composition category `event`
pub const CATEGORY_EVENT: (&str, &str) = ("433", "event");
/// Composition category `persistent`
pub const CATEGORY_PERSISTENT: (&str, &str) = ("431", "persistent");

/// Setting used when the context bag names none
pub const DEFAULT_SETTING: (&str, &str) = ("238", "other care");

/// openEHR care settings (code, rubric)
pub const SETTINGS: &[(&str, &str)] = &[
    ("225", "home"),
    ("227", "emergency care"),
    ("228", "primary medical care"),
    ("229", "primary nursing care"),
    ("230", "primary allied health care"),
    ("231", "midwifery care"),
    ("232", "secondary medical care"),
    ("233", "secondary nursing care"),
    ("234", "secondary allied health care"),
    ("235", "complementary health care"),
    ("236", "dental care"),
    ("237", "nursing home care"),
    ("238", "other care"),
];

/// Rubric of a setting code
pub fn setting_name(code: &str) -> Option<&'static str> {
    SETTINGS
        .iter()
        .find(|(setting, _)| *setting == code)
        .map(|(_, name)| *name)
}

/// Participation mode used when none is supplied
pub const DEFAULT_PARTICIPATION_MODE: (&str, &str) = ("193", "not specified");

/// openEHR participation modes (code, rubric)
pub const PARTICIPATION_MODES: &[(&str, &str)] = &[
    ("193", "not specified"),
    ("216", "face-to-face communication"),
    ("223", "interpreted face-to-face communication"),
    ("217", "signing"),
    ("195", "live audiovisual; videoconference; videophone"),
    ("198", "videoconferencing"),
    ("197", "live audio-only; telephone; internet phone; teleconference"),
    ("202", "telephone"),
    ("204", "teleconference"),
    ("203", "internet telephone"),
    ("212", "asynchronous text; email; fax; letter; handwritten note; SMS"),
    ("213", "fax"),
    ("214", "email"),
];

/// Rubric of a participation mode code
pub fn participation_mode_name(code: &str) -> Option<&'static str> {
    PARTICIPATION_MODES
        .iter()
        .find(|(mode, _)| *mode == code)
        .map(|(_, name)| *name)
}

/// Character set used when the context bag names none
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// `action_archetype_id` written into activities
pub const ANY_ACTION_ARCHETYPE: &str = "/.*/";

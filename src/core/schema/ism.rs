//! ISM transition tables
//!
//! ACTION entries carry an `ism_transition` whose careflow step (a local code
//! from the archetype) determines the instruction state machine's current
//! state. The schema lists every careflow step with the state it leads to;
//! resolution is a pure lookup with an explicit-state override.

use crate::core::value::rm::dv_coded_text;
use crate::domain::{ConversionError, ConversionResult, WebTemplateInput};
use indexmap::IndexMap;
use serde_json::{json, Value};

/// Terminology of ISM states and transitions
pub const ISM_TERMINOLOGY: &str = "openehr";

/// openEHR instruction states (code, rubric)
const ISM_STATES: &[(&str, &str)] = &[
    ("524", "initial"),
    ("526", "planned"),
    ("527", "postponed"),
    ("528", "cancelled"),
    ("529", "scheduled"),
    ("530", "suspended"),
    ("531", "aborted"),
    ("532", "completed"),
    ("533", "expired"),
    ("245", "active"),
];

/// Rubric of an openEHR instruction state code
pub fn state_name(code: &str) -> Option<&'static str> {
    ISM_STATES
        .iter()
        .find(|(state, _)| *state == code)
        .map(|(_, name)| *name)
}

/// A coded ISM value (state, careflow step or transition)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsmCode {
    pub code: String,
    pub value: String,
    pub terminology: String,
}

impl IsmCode {
    fn openehr(code: &str, value: &str) -> Self {
        Self {
            code: code.to_string(),
            value: value.to_string(),
            terminology: ISM_TERMINOLOGY.to_string(),
        }
    }
}

/// Careflow step declared by the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareflowStep {
    pub code: String,
    pub label: String,
    pub current_state: Option<String>,
}

/// Careflow step → current state table of one ISM_TRANSITION node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    steps: IndexMap<String, CareflowStep>,
}

/// Input to a transition lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsmRequest {
    pub careflow_step: Option<String>,
    pub current_state: Option<String>,
    pub current_state_value: Option<String>,
    pub transition: Option<String>,
    pub transition_value: Option<String>,
}

impl IsmRequest {
    /// Whether the request carries anything at all
    pub fn is_empty(&self) -> bool {
        self.careflow_step.is_none() && self.current_state.is_none() && self.transition.is_none()
    }
}

/// Resolved transition, ready to be written as an ISM_TRANSITION
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsmResolution {
    pub current_state: IsmCode,
    pub careflow_step: Option<IsmCode>,
    pub transition: Option<IsmCode>,
}

impl IsmResolution {
    /// Raw ISM_TRANSITION
    pub fn to_rm(&self) -> Value {
        let coded = |code: &IsmCode| dv_coded_text(&code.value, &code.terminology, &code.code);
        let mut raw = json!({
            "_type": "ISM_TRANSITION",
            "current_state": coded(&self.current_state)
        });
        if let Some(step) = &self.careflow_step {
            raw["careflow_step"] = coded(step);
        }
        if let Some(transition) = &self.transition {
            raw["transition"] = coded(transition);
        }
        raw
    }
}

impl TransitionTable {
    /// Builds the table from the careflow step input of an ISM node
    ///
    /// Each list item's first `currentStates` entry is the state the step
    /// leads to.
    pub fn from_input(input: &WebTemplateInput, language: &str) -> Self {
        let steps = input
            .list
            .iter()
            .map(|item| {
                (
                    item.value.clone(),
                    CareflowStep {
                        code: item.value.clone(),
                        label: item.display_label(language).to_string(),
                        current_state: item.current_states.first().cloned(),
                    },
                )
            })
            .collect();
        Self { steps }
    }

    /// Number of declared careflow steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no careflow step is declared
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared careflow step for a code
    pub fn step(&self, code: &str) -> Option<&CareflowStep> {
        self.steps.get(code)
    }

    /// Resolves a request into current state, careflow step and transition
    ///
    /// An explicit current state always wins over the table. Without one, the
    /// careflow step must be declared and lead to a state, otherwise
    /// [`ConversionError::UnknownTransition`] is raised.
    pub fn resolve(&self, node: &str, request: &IsmRequest) -> ConversionResult<IsmResolution> {
        let careflow_step = match &request.careflow_step {
            Some(code) => Some(match self.step(code) {
                Some(step) => IsmCode {
                    code: step.code.clone(),
                    value: step.label.clone(),
                    terminology: "local".to_string(),
                },
                None if request.current_state.is_some() => IsmCode {
                    code: code.clone(),
                    value: code.clone(),
                    terminology: "local".to_string(),
                },
                None => {
                    return Err(ConversionError::UnknownTransition {
                        node: node.to_string(),
                        careflow_step: code.clone(),
                    })
                }
            }),
            None => None,
        };

        let state_code = match (&request.current_state, &request.careflow_step) {
            (Some(state), _) => state.clone(),
            (None, Some(step)) => self
                .step(step)
                .and_then(|s| s.current_state.clone())
                .ok_or_else(|| ConversionError::UnknownTransition {
                    node: node.to_string(),
                    careflow_step: step.clone(),
                })?,
            (None, None) => {
                return Err(ConversionError::invalid_attribute(
                    "current_state",
                    format!("'{node}' needs a careflow step or an explicit current state"),
                ))
            }
        };

        let state_value = match &request.current_state_value {
            Some(value) if request.current_state.is_some() => value.clone(),
            _ => state_name(&state_code)
                .map(str::to_string)
                .ok_or_else(|| ConversionError::UnknownCode {
                    code: state_code.clone(),
                    value_set: "openehr ISM states".to_string(),
                })?,
        };

        let transition = request.transition.as_ref().map(|code| {
            IsmCode::openehr(
                code,
                request.transition_value.as_deref().unwrap_or(code.as_str()),
            )
        });

        Ok(IsmResolution {
            current_state: IsmCode::openehr(&state_code, &state_value),
            careflow_step,
            transition,
        })
    }
}

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(AnalysisId);
id_newtype!(StepId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub reason: String,
}

/// Unauthenticated score summary shown before the email gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickResult {
    pub overall_score: u8,
    pub per_category: BTreeMap<String, CategoryScore>,
}

impl QuickResult {
    pub fn grade_letter(&self) -> char {
        grade_letter(self.overall_score)
    }
}

pub fn grade_letter(score: u8) -> char {
    match score {
        90.. => 'A',
        80..=89 => 'B',
        70..=79 => 'C',
        60..=69 => 'D',
        _ => 'F',
    }
}

/// Display tier for scores. Views map these onto colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl ScoreTier {
    /// Overall scores (0-100) use the 90/70/50 breakpoints.
    pub fn for_overall(score: u8) -> Self {
        match score {
            90.. => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            _ => Self::Critical,
        }
    }

    /// Category scores (0-5) use the 5/4/3/2 breakpoints.
    pub fn for_category(score: u8) -> Self {
        match score {
            5.. => Self::Excellent,
            4 => Self::Good,
            3 => Self::Fair,
            2 => Self::Poor,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPriority {
    High,
    Medium,
    Low,
}

impl StepPriority {
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "High Priority",
            Self::Medium => "Medium Priority",
            Self::Low => "Low Priority",
        }
    }
}

/// One self-serve improvement step attached to an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiyStep {
    pub id: StepId,
    pub priority: StepPriority,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Groups steps in display order (high, medium, low), dropping empty groups.
pub fn group_steps_by_priority(steps: &[DiyStep]) -> Vec<(StepPriority, Vec<&DiyStep>)> {
    [StepPriority::High, StepPriority::Medium, StepPriority::Low]
        .into_iter()
        .map(|priority| {
            let group = steps
                .iter()
                .filter(|step| step.priority == priority)
                .collect::<Vec<_>>();
            (priority, group)
        })
        .filter(|(_, group)| !group.is_empty())
        .collect()
}

/// User privacy choices. Serialized with camelCase keys so the stored record keeps the
/// same layout across clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsentPreferences {
    pub necessary: bool,
    pub functional: bool,
    pub analytics: bool,
    pub marketing: bool,
    pub do_not_sell: bool,
    pub consent_given_at: Option<DateTime<Utc>>,
}

impl Default for ConsentPreferences {
    fn default() -> Self {
        Self {
            necessary: true,
            functional: false,
            analytics: false,
            marketing: false,
            do_not_sell: false,
            consent_given_at: None,
        }
    }
}

impl ConsentPreferences {
    pub fn accept_all() -> Self {
        Self {
            functional: true,
            analytics: true,
            marketing: true,
            do_not_sell: false,
            ..Self::default()
        }
    }

    pub fn minimal() -> Self {
        Self {
            functional: false,
            analytics: false,
            marketing: false,
            do_not_sell: true,
            ..Self::default()
        }
    }
}

/// Partial update from the privacy center. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_not_sell: Option<bool>,
}

impl ConsentUpdate {
    pub fn apply_to(&self, current: &ConsentPreferences) -> ConsentPreferences {
        ConsentPreferences {
            necessary: true,
            functional: self.functional.unwrap_or(current.functional),
            analytics: self.analytics.unwrap_or(current.analytics),
            marketing: self.marketing.unwrap_or(current.marketing),
            do_not_sell: self.do_not_sell.unwrap_or(current.do_not_sell),
            consent_given_at: current.consent_given_at,
        }
    }
}

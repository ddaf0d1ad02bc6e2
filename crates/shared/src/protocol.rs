use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{AnalysisId, CategoryScore, DiyStep, QuickResult},
    lenient,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAnalyzeRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAnalyzeResponse {
    pub analysis_id: AnalysisId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub overall_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_quality: Option<CategoryScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_optimization: Option<CategoryScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_trust: Option<CategoryScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_agent_compatibility: Option<CategoryScore>,
}

impl QuickAnalyzeResponse {
    pub fn quick_result(&self) -> QuickResult {
        let per_category = [
            ("content_quality", &self.content_quality),
            ("structure_optimization", &self.structure_optimization),
            ("authority_trust", &self.authority_trust),
            ("ai_agent_compatibility", &self.ai_agent_compatibility),
        ]
        .into_iter()
        .filter_map(|(name, score)| score.clone().map(|score| (name.to_string(), score)))
        .collect::<BTreeMap<_, _>>();

        QuickResult {
            overall_score: self.overall_score.min(100),
            per_category,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub url: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Acknowledgement body. Most routes answer `{"message": ...}`; a missing message is
/// tolerated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireRequest {
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub email: String,
    pub site_id: AnalysisId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsResponse {
    #[serde(default)]
    pub steps: Vec<DiyStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpdateRequest {
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMeta {
    #[serde(deserialize_with = "lenient::text")]
    pub report_title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub scope: String,
    #[serde(deserialize_with = "lenient::text")]
    pub analyzed_at: String,
    #[serde(deserialize_with = "lenient::score")]
    pub overall_score: u8,
    #[serde(deserialize_with = "lenient::text")]
    pub analyst: String,
    #[serde(deserialize_with = "lenient::text")]
    pub tool_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutiveSummary {
    #[serde(deserialize_with = "lenient::text")]
    pub summary_paragraph: String,
    #[serde(deserialize_with = "lenient::text_list")]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindingScore {
    #[serde(deserialize_with = "lenient::score")]
    pub score: u8,
    #[serde(deserialize_with = "lenient::text")]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallFindings {
    #[serde(deserialize_with = "lenient::section")]
    pub content_quality: FindingScore,
    #[serde(deserialize_with = "lenient::section")]
    pub structure: FindingScore,
    #[serde(deserialize_with = "lenient::section")]
    pub authority_signals: FindingScore,
    #[serde(deserialize_with = "lenient::section")]
    pub ai_agent_compatibility: FindingScore,
    #[serde(deserialize_with = "lenient::text")]
    pub impact: String,
    #[serde(deserialize_with = "lenient::text_list")]
    pub common_themes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strengths {
    #[serde(deserialize_with = "lenient::text_list")]
    pub brand_domain_trust: Vec<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub navigation_layout: Vec<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub technical_signals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weaknesses {
    #[serde(deserialize_with = "lenient::text_list")]
    pub content_depth: Vec<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub authority_trust: Vec<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub semantic_accessibility: Vec<String>,
    #[serde(deserialize_with = "lenient::text_list")]
    pub ux_friction: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicationsForAeo {
    #[serde(deserialize_with = "lenient::text")]
    pub overview: String,
    #[serde(deserialize_with = "lenient::text_list")]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendation {
    #[serde(deserialize_with = "lenient::text")]
    pub priority: String,
    #[serde(deserialize_with = "lenient::text")]
    pub owner: String,
    #[serde(deserialize_with = "lenient::text")]
    pub effort: String,
    #[serde(deserialize_with = "lenient::text")]
    pub impact: String,
    #[serde(deserialize_with = "lenient::text")]
    pub action: String,
    #[serde(deserialize_with = "lenient::text")]
    pub rationale: String,
    #[serde(deserialize_with = "lenient::text_list")]
    pub success_metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecklistItem {
    #[serde(deserialize_with = "lenient::text")]
    pub action: String,
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(deserialize_with = "lenient::text")]
    pub target_metric: String,
    #[serde(deserialize_with = "lenient::text")]
    pub why_it_matters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageScore {
    #[serde(deserialize_with = "lenient::text")]
    pub url: String,
    #[serde(deserialize_with = "lenient::score")]
    pub score: u8,
    #[serde(deserialize_with = "lenient::text_list")]
    pub key_observations: Vec<String>,
}

/// Email-gated report payload. The content is generated, so every field decodes
/// leniently: missing, `null` or mistyped values fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedReport {
    #[serde(deserialize_with = "lenient::section")]
    pub meta: ReportMeta,
    #[serde(deserialize_with = "lenient::section")]
    pub executive_summary: ExecutiveSummary,
    #[serde(deserialize_with = "lenient::section")]
    pub overall_findings: OverallFindings,
    #[serde(deserialize_with = "lenient::section")]
    pub strengths: Strengths,
    #[serde(deserialize_with = "lenient::section")]
    pub weaknesses: Weaknesses,
    #[serde(deserialize_with = "lenient::section")]
    pub implications_for_aeo: ImplicationsForAeo,
    #[serde(deserialize_with = "lenient::items")]
    pub recommendations: Vec<Recommendation>,
    #[serde(deserialize_with = "lenient::items")]
    pub quick_win_checklist: Vec<ChecklistItem>,
    #[serde(deserialize_with = "lenient::items")]
    pub page_scores: Vec<PageScore>,
    #[serde(deserialize_with = "lenient::items")]
    pub ab_testing_plan: Vec<serde_json::Value>,
    #[serde(deserialize_with = "lenient::items")]
    pub kpis_to_monitor: Vec<serde_json::Value>,
    #[serde(deserialize_with = "lenient::text")]
    pub bottom_line: String,
}

//! Core types for the school matching client

use crate::assemble::{MillisSessionIds, SessionIdSource};
use crate::lenient;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Answer text used when a run recovers nothing at all
pub const DEFAULT_FALLBACK_MESSAGE: &str = "匹配完成，但未获取到详细结果";

/// Endpoint the advising console posts match requests to
pub const DEFAULT_ENDPOINT: &str = "/api/school-match";

/// Options for configuring a [`MatchClient`](crate::MatchClient)
#[derive(Clone)]
pub struct MatchOptions {
    /// Base URL of the advising console or match proxy
    pub base_url: String,

    /// Path appended to `base_url` for match submissions
    pub endpoint: String,

    /// Timeout for sending the request and receiving response headers, in seconds
    pub request_timeout: u64,

    /// Longest silence tolerated between two body chunks
    pub inactivity_timeout: Duration,

    /// Answer text used when nothing was recovered
    pub fallback_message: String,

    /// Source of fresh session identifiers
    pub session_ids: Arc<dyn SessionIdSource>,
}

impl std::fmt::Debug for MatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchOptions")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("fallback_message", &self.fallback_message)
            .field("session_ids", &"<dyn SessionIdSource>")
            .finish()
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: 300,
            inactivity_timeout: Duration::from_secs(60),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            session_ids: Arc::new(MillisSessionIds),
        }
    }
}

impl MatchOptions {
    /// Create a new builder for MatchOptions
    pub fn builder() -> MatchOptionsBuilder {
        MatchOptionsBuilder::default()
    }

    /// Full URL match requests are posted to
    pub fn match_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

/// Builder for MatchOptions
#[derive(Default)]
pub struct MatchOptionsBuilder {
    base_url: Option<String>,
    endpoint: Option<String>,
    request_timeout: Option<u64>,
    inactivity_timeout: Option<Duration>,
    fallback_message: Option<String>,
    session_ids: Option<Arc<dyn SessionIdSource>>,
}

impl std::fmt::Debug for MatchOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchOptionsBuilder")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .finish()
    }
}

impl MatchOptionsBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Some(secs);
        self
    }

    pub fn inactivity_timeout(mut self, window: Duration) -> Self {
        self.inactivity_timeout = Some(window);
        self
    }

    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = Some(message.into());
        self
    }

    pub fn session_ids(mut self, source: impl SessionIdSource + 'static) -> Self {
        self.session_ids = Some(Arc::new(source));
        self
    }

    pub fn build(self) -> crate::Result<MatchOptions> {
        let base_url = self
            .base_url
            .ok_or_else(|| crate::Error::config("base_url is required"))?;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(crate::Error::config(format!(
                "base_url must be an http(s) URL, got {base_url:?}"
            )));
        }

        let inactivity_timeout = self.inactivity_timeout.unwrap_or(Duration::from_secs(60));
        if inactivity_timeout.is_zero() {
            return Err(crate::Error::config("inactivity_timeout must be non-zero"));
        }

        Ok(MatchOptions {
            base_url,
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            request_timeout: self.request_timeout.unwrap_or(300),
            inactivity_timeout,
            fallback_message: self
                .fallback_message
                .unwrap_or_else(|| DEFAULT_FALLBACK_MESSAGE.to_string()),
            session_ids: self.session_ids.unwrap_or_else(|| Arc::new(MillisSessionIds)),
        })
    }
}

/// Tier a matched school falls into relative to the student's profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchoolTier {
    Reach,
    Match,
    Safety,
    Other(String),
}

impl SchoolTier {
    /// Maps the backend's tier labels (Chinese or English) onto a tier
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "冲刺" | "reach" => SchoolTier::Reach,
            "匹配" | "match" | "target" => SchoolTier::Match,
            "保底" | "safety" => SchoolTier::Safety,
            other => SchoolTier::Other(other.to_string()),
        }
    }
}

/// One school the backend matched against the student's profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchedSchool {
    /// Tier label, e.g. "冲刺"/"匹配"/"保底"
    #[serde(deserialize_with = "lenient::string")]
    pub school_category: String,
    /// Ranking as sent, e.g. "12" or "N/A"
    #[serde(deserialize_with = "lenient::string")]
    pub qs_ranking: String,
    #[serde(deserialize_with = "lenient::string")]
    pub chinese_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub english_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub course_link: String,
    #[serde(deserialize_with = "lenient::string")]
    pub admission_requirement: String,
    #[serde(deserialize_with = "lenient::string")]
    pub recommendation_reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub major_category: String,
    #[serde(deserialize_with = "lenient::string")]
    pub location: String,
    #[serde(deserialize_with = "lenient::string")]
    pub comments: String,
}

impl MatchedSchool {
    /// Numeric ranking, or `None` for the unknown-rank sentinel
    pub fn ranking(&self) -> Option<u32> {
        lenient::parse_u32(&Value::String(self.qs_ranking.clone()))
    }

    pub fn tier(&self) -> SchoolTier {
        SchoolTier::from_label(&self.school_category)
    }
}

/// GPA thresholds in the three scales the backend reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpaRequirement {
    #[serde(deserialize_with = "lenient::string")]
    pub percentage: String,
    #[serde(deserialize_with = "lenient::string")]
    pub four_point: String,
    #[serde(deserialize_with = "lenient::string")]
    pub uk_degree: String,
}

/// Whether a standardized test is needed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Requirement {
    Required,
    NotRequired,
    Optional,
    #[default]
    Unspecified,
    Other(String),
}

impl Requirement {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "" => Requirement::Unspecified,
            "需要" | "必须" | "required" | "yes" | "true" => Requirement::Required,
            "不需要" | "无" | "not required" | "no" | "false" => Requirement::NotRequired,
            "可选" | "推荐" | "optional" | "recommended" => Requirement::Optional,
            _ => Requirement::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Requirement::Required => "需要",
            Requirement::NotRequired => "不需要",
            Requirement::Optional => "可选",
            Requirement::Unspecified => "",
            Requirement::Other(label) => label,
        }
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(true) => Requirement::Required,
            Value::Bool(false) => Requirement::NotRequired,
            other => lenient::value_to_text(&other)
                .map(|label| Requirement::from_label(&label))
                .unwrap_or_default(),
        })
    }
}

/// GRE/GMAT style requirement of a program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRequirement {
    pub required: Requirement,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub test_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub score: String,
}

/// One program the backend recommends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendedProject {
    #[serde(deserialize_with = "lenient::opt_u32")]
    pub school_ranking: Option<u32>,
    #[serde(deserialize_with = "lenient::string")]
    pub school_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub project_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub duration: String,
    #[serde(deserialize_with = "lenient::string")]
    pub tuition_fee: String,
    #[serde(deserialize_with = "lenient::string")]
    pub ielts_requirement: String,
    #[serde(deserialize_with = "lenient::record")]
    pub gpa_requirement: GpaRequirement,
    #[serde(deserialize_with = "lenient::record")]
    pub gre_gmat_requirement: TestRequirement,
    #[serde(deserialize_with = "lenient::string")]
    pub application_difficulty: String,
    #[serde(deserialize_with = "lenient::string_list")]
    pub matched_tags: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub project_link: String,
}

/// The backend's summary of the student's own profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentBackground {
    #[serde(deserialize_with = "lenient::string")]
    pub domestic_university: String,
    #[serde(deserialize_with = "lenient::string")]
    pub university_level: String,
    #[serde(deserialize_with = "lenient::string")]
    pub gpa_info: String,
    #[serde(deserialize_with = "lenient::string")]
    pub major_background: String,
}

/// The three structured result fields, each independently present or absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredFields {
    pub matched_schools: Option<Vec<MatchedSchool>>,
    pub student_background: Option<StudentBackground>,
    pub recommended_projects: Option<Vec<RecommendedProject>>,
}

impl StructuredFields {
    pub const MATCHED_SCHOOLS: &'static str = "matched_schools";
    pub const STUDENT_BACKGROUND: &'static str = "student_background";
    pub const RECOMMENDED_PROJECTS: &'static str = "recommended_projects";

    /// Keys a candidate JSON object must carry at least one of
    pub const KEYS: [&'static str; 3] = [
        Self::MATCHED_SCHOOLS,
        Self::STUDENT_BACKGROUND,
        Self::RECOMMENDED_PROJECTS,
    ];

    /// Reads whichever of the three keys are present and non-null.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let field = |key: &str| object.get(key).filter(|v| !v.is_null());
        Self {
            matched_schools: field(Self::MATCHED_SCHOOLS)
                .and_then(|v| lenient::decode_list(v, Self::MATCHED_SCHOOLS)),
            student_background: field(Self::STUDENT_BACKGROUND).and_then(lenient::decode_record),
            recommended_projects: field(Self::RECOMMENDED_PROJECTS)
                .and_then(|v| lenient::decode_list(v, Self::RECOMMENDED_PROJECTS)),
        }
    }

    /// True when the object carries at least one target key with a non-null value
    pub fn object_has_any(object: &Map<String, Value>) -> bool {
        Self::KEYS
            .iter()
            .any(|key| object.get(*key).is_some_and(|v| !v.is_null()))
    }

    /// Takes every non-null field of `other`; absent fields never clear ours.
    pub fn adopt(&mut self, other: StructuredFields) {
        if other.matched_schools.is_some() {
            self.matched_schools = other.matched_schools;
        }
        if other.student_background.is_some() {
            self.student_background = other.student_background;
        }
        if other.recommended_projects.is_some() {
            self.recommended_projects = other.recommended_projects;
        }
    }

    /// Fills only the fields that are still missing.
    pub fn fill_missing(&mut self, other: StructuredFields) {
        if self.matched_schools.is_none() {
            self.matched_schools = other.matched_schools;
        }
        if self.student_background.is_none() {
            self.student_background = other.student_background;
        }
        if self.recommended_projects.is_none() {
            self.recommended_projects = other.recommended_projects;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matched_schools.is_none()
            && self.student_background.is_none()
            && self.recommended_projects.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.matched_schools.is_some()
            && self.student_background.is_some()
            && self.recommended_projects.is_some()
    }

    /// Names of the fields still missing, for log lines
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.matched_schools.is_none() {
            missing.push(Self::MATCHED_SCHOOLS);
        }
        if self.student_background.is_none() {
            missing.push(Self::STUDENT_BACKGROUND);
        }
        if self.recommended_projects.is_none() {
            missing.push(Self::RECOMMENDED_PROJECTS);
        }
        missing
    }
}

/// One `step` event reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepRecord {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Final outcome of one match submission, handed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default = "default_success")]
    pub success: bool,

    /// Assembled answer text
    #[serde(default, deserialize_with = "lenient::string")]
    pub response: String,

    /// RFC 3339 capture time
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub session_id: String,

    #[serde(
        default,
        deserialize_with = "lenient::opt_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub matched_schools: Option<Vec<MatchedSchool>>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_record",
        skip_serializing_if = "Option::is_none"
    )]
    pub student_background: Option<StudentBackground>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommended_projects: Option<Vec<RecommendedProject>>,

    /// Every progress message surfaced during the run, in order
    #[serde(
        rename = "progressMessages",
        default,
        deserialize_with = "lenient::string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub progress_messages: Vec<String>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub steps: Option<Vec<StepRecord>>,

    /// Raw diagnostic payload, usually the last final-kind event
    #[serde(rename = "eventData", default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

impl MatchResult {
    /// The structured fields currently held by this result
    pub fn structured(&self) -> StructuredFields {
        StructuredFields {
            matched_schools: self.matched_schools.clone(),
            student_background: self.student_background.clone(),
            recommended_projects: self.recommended_projects.clone(),
        }
    }

    pub fn set_structured(&mut self, fields: StructuredFields) {
        self.matched_schools = fields.matched_schools;
        self.student_background = fields.student_background;
        self.recommended_projects = fields.recommended_projects;
    }

    pub fn has_structured_data(&self) -> bool {
        !self.structured().is_empty()
    }
}

/// Student profile as entered in the form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormData {
    pub student_school: String,
    pub grade_system: String,
    pub grade: String,
    pub is_current_student: bool,
    pub target_school: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub major: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language_test_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub language_test_score: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub standardized_test_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub standardized_test_score: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub requirements: String,
}

/// Prompt overrides forwarded to the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptData {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub task: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_format: String,
}

/// Body posted to the match endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    #[serde(flatten)]
    pub form: FormData,
    #[serde(flatten)]
    pub prompt: PromptData,
}

impl MatchRequest {
    pub fn new(form: FormData, prompt: PromptData) -> Self {
        Self { form, prompt }
    }

    /// Checks the fields the backend cannot work without
    pub fn validate(&self) -> crate::Result<()> {
        if self.form.student_school.trim().is_empty() {
            return Err(crate::Error::invalid_input("studentSchool is required"));
        }
        if self.form.grade.trim().is_empty() {
            return Err(crate::Error::invalid_input("grade is required"));
        }
        if let Some(system) = GradeSystem::parse(&self.form.grade_system) {
            if !system.validate(&self.form.grade) {
                return Err(crate::Error::invalid_input(format!(
                    "grade {:?} is out of range for {}",
                    self.form.grade, self.form.grade_system
                )));
            }
        }
        Ok(())
    }
}

/// Grading scales the form accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSystem {
    /// 百分制
    Percentage,
    /// 五分制
    FivePoint,
    /// 四分制
    FourPoint,
    /// 英国学位制
    UkDegree,
}

impl GradeSystem {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "百分制" | "percentage" => Some(GradeSystem::Percentage),
            "五分制" | "five_point" => Some(GradeSystem::FivePoint),
            "四分制" | "four_point" => Some(GradeSystem::FourPoint),
            "英国学位制" | "uk_degree" => Some(GradeSystem::UkDegree),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GradeSystem::Percentage => "百分制",
            GradeSystem::FivePoint => "五分制",
            GradeSystem::FourPoint => "四分制",
            GradeSystem::UkDegree => "英国学位制",
        }
    }

    fn percent_factor(&self) -> Option<f64> {
        match self {
            GradeSystem::Percentage => Some(1.0),
            GradeSystem::FivePoint => Some(20.0),
            GradeSystem::FourPoint => Some(25.0),
            GradeSystem::UkDegree => None,
        }
    }

    /// Whether `grade` is a number inside this scale.
    /// UK degree classes are free text and always accepted when non-empty.
    pub fn validate(&self, grade: &str) -> bool {
        let Some(factor) = self.percent_factor() else {
            return !grade.trim().is_empty();
        };
        grade
            .trim()
            .parse::<f64>()
            .is_ok_and(|g| (0.0..=100.0 / factor).contains(&g))
    }

    /// Converts a grade to another scale via the percentage scale.
    /// Percentages round to a whole number, other scales keep one decimal.
    pub fn convert(&self, grade: &str, to: GradeSystem) -> Option<String> {
        let from_factor = self.percent_factor()?;
        let to_factor = to.percent_factor()?;
        let grade: f64 = grade.trim().parse().ok()?;
        let converted = grade * from_factor / to_factor;
        Some(match to {
            GradeSystem::Percentage => format!("{}", converted.round() as i64),
            _ => format!("{converted:.1}"),
        })
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// The backend emits `null` for missing strings and lists as often as it omits them.
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub company: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub salary: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub requirements: Vec<String>,
    #[serde(rename = "postedDate", default)]
    pub posted_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>, // "active", "applied"
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "matchScore", default)]
    pub match_score: Option<f64>,
    #[serde(rename = "matchDetails", default)]
    pub match_details: Option<MatchDetails>,
    /// Set locally when a per-card analysis request fails.
    #[serde(skip)]
    pub analysis_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(default)]
    pub overall_match: f64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub key_skills: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub matching_skills: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub seniority_match: String, // "High", "Medium", "Low"
    #[serde(default, deserialize_with = "null_to_default")]
    pub role_alignment: String, // "Strong", "Good", "Moderate"
    #[serde(default, deserialize_with = "null_to_default")]
    pub match_explanation: String,
}

/// One page of jobs as returned by the listing endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobPage {
    #[serde(default, deserialize_with = "null_to_default")]
    pub jobs: Vec<JobSummary>,
    #[serde(default)]
    pub total: u64,
}

impl JobPage {
    pub fn total_pages(&self, page_size: u32) -> u64 {
        if page_size == 0 {
            return 0;
        }
        self.total.div_ceil(page_size as u64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverLetter {
    pub cover_letter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyResponse {
    #[serde(default)]
    pub message: String,
}

// --- Resume enhancement ---

/// A suggestion entry is either plain text or a structured object whose shape
/// varies between generations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Suggestion {
    Text(String),
    Structured(serde_json::Map<String, Value>),
    Other(Value),
}

impl Suggestion {
    pub fn display(&self) -> String {
        match self {
            Suggestion::Text(text) => text.clone(),
            Suggestion::Structured(map) => map
                .iter()
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{}: {}", key, s),
                    other => format!("{}: {}", key, other),
                })
                .collect::<Vec<_>>()
                .join("; "),
            Suggestion::Other(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawSection")]
pub struct SectionSuggestion {
    pub section: String,
    pub explanation: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSection {
    Text(String),
    Detailed {
        section: Option<String>,
        explanation: Option<String>,
    },
    Other(Value),
}

impl From<RawSection> for SectionSuggestion {
    fn from(raw: RawSection) -> Self {
        match raw {
            RawSection::Text(explanation) => SectionSuggestion {
                section: "General".to_string(),
                explanation,
            },
            RawSection::Detailed { section, explanation } => SectionSuggestion {
                section: section.unwrap_or_else(|| "Unknown Section".to_string()),
                explanation: explanation.unwrap_or_default(),
            },
            RawSection::Other(value) => SectionSuggestion {
                section: "General".to_string(),
                explanation: value.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ResumeSuggestions {
    #[serde(default, deserialize_with = "null_to_default")]
    pub bullet_points: Vec<Suggestion>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub skills: Vec<Suggestion>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub achievements: Vec<Suggestion>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub keywords: Vec<Suggestion>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub sections: Vec<SectionSuggestion>,
}

// --- Users ---

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "null_to_default")]
    pub name: String,
    #[serde(default)]
    pub preferences: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub preferences: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: String,
    pub user: UserProfile,
}

/// Full account record from `GET /api/users/{email}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub phone: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub linkedin_url: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub github_url: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub portfolio_url: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub preferences: Value,
    #[serde(rename = "resume_uploaded", default)]
    pub resume_uploaded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: Profile,
}

/// Changes requested from the command line. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub portfolio_url: Option<String>,
    pub desired_role: Option<String>,
    pub desired_location: Option<String>,
    pub work_type: Option<String>,
    pub expected_salary: Option<String>,
    pub skills: Option<Vec<String>>,
    pub industries: Option<Vec<String>>,
    pub experience: Option<String>,
    pub will_relocate: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.location.is_none()
            && self.linkedin_url.is_none()
            && self.github_url.is_none()
            && self.portfolio_url.is_none()
            && self.desired_role.is_none()
            && self.desired_location.is_none()
            && self.work_type.is_none()
            && self.expected_salary.is_none()
            && self.skills.is_none()
            && self.industries.is_none()
            && self.experience.is_none()
            && self.will_relocate.is_none()
    }

    /// Merges the changes into the current profile. The server replaces the
    /// whole record on update, so every field is sent back.
    pub fn apply(&self, mut profile: Profile) -> Profile {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        }
        set(&mut profile.name, &self.name);
        set(&mut profile.phone, &self.phone);
        set(&mut profile.location, &self.location);
        set(&mut profile.linkedin_url, &self.linkedin_url);
        set(&mut profile.github_url, &self.github_url);
        set(&mut profile.portfolio_url, &self.portfolio_url);

        let mut preferences = match profile.preferences {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let text_prefs = [
            ("desiredRole", &self.desired_role),
            ("desiredLocation", &self.desired_location),
            ("workType", &self.work_type),
            ("expectedSalary", &self.expected_salary),
            ("experience", &self.experience),
        ];
        for (key, value) in text_prefs {
            if let Some(value) = value {
                preferences.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
        }
        // Skills travel as one comma-separated string.
        if let Some(skills) = &self.skills {
            preferences.insert("skills".to_string(), Value::String(join_list(skills)));
        }
        if let Some(industries) = &self.industries {
            let list = industries
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            preferences.insert("industries".to_string(), Value::Array(list));
        }
        if let Some(relocate) = self.will_relocate {
            preferences.insert("willRelocate".to_string(), Value::Bool(relocate));
        }
        profile.preferences = Value::Object(preferences);
        profile
    }
}

fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub linkedin_url: String,
    pub github_url: String,
    pub portfolio_url: String,
    pub preferences: Value,
}

impl From<&Profile> for UpdateProfileRequest {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            location: profile.location.clone(),
            linkedin_url: profile.linkedin_url.clone(),
            github_url: profile.github_url.clone(),
            portfolio_url: profile.portfolio_url.clone(),
            preferences: profile.preferences.clone(),
        }
    }
}

// --- Resumes ---

pub const MAX_RESUME_BYTES: u64 = 5 * 1024 * 1024;

/// Content type for an uploadable resume, or `None` if the extension is not accepted.
pub fn resume_content_type(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub message: String,
    pub version: u32,
    #[serde(default)]
    pub filename: String,
}

/// Metadata for one stored resume, with a short-lived download link.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub filename: String,
    pub version: u32,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub content_type: String,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResumeVersion {
    pub version: u32,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub filename: String,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResumeVersions {
    #[serde(default, deserialize_with = "null_to_default")]
    pub versions: Vec<ResumeVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedText {
    #[serde(default, deserialize_with = "null_to_default")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ResumeAnalysis {
    #[serde(default, deserialize_with = "null_to_default")]
    pub resume_feedback: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub upskilling_suggestions: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub matching_roles: String,
    #[serde(default)]
    pub analysis_date: Option<String>,
}

/// Both the analyze and latest-analysis endpoints. The latter answers with
/// only a message when nothing has been analyzed yet.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeAnalysisResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub analysis: Option<ResumeAnalysis>,
}

//! Learning-management platform client (Moodle web services).
//!
//! Two capabilities are exposed as traits so the core never depends on a
//! concrete platform:
//!
//! | Trait | Used by | Operations |
//! |-------|---------|------------|
//! | [`ContentSource`] | ingestion | course tree, file download, course list |
//! | [`GradeSource`] | student store, analytics | user identity, quiz grades, enrolment |
//!
//! [`MoodleClient`] implements both against the REST endpoint
//! `{url}/webservice/rest/server.php`. [`MockContentSource`] serves a fixed
//! offline course for development when `[lms] mock = true`.
//!
//! Moodle reports most failures as HTTP 200 with an `exception` payload;
//! those are turned into errors here so callers see a single failure path.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LmsConfig;
use crate::grades;

/// Primary and secondary operations of the course-list fallback chain.
pub const COURSES_PRIMARY: &str = "core_course_get_courses";
pub const COURSES_SECONDARY: &str = "core_course_get_courses_by_field";

// ═══════════════════════════════════════════════════════════════════════
// Content tree
// ═══════════════════════════════════════════════════════════════════════

/// Deserialize `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One section of a course, as returned by `core_course_get_contents`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CourseSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modules: Vec<CourseModule>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CourseModule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub modname: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contents: Vec<ModuleContent>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dates: Vec<ModuleDate>,
}

/// A file or inline body belonging to a module.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModuleContent {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub fileurl: Option<String>,
    /// Inline HTML body (pages).
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleDate {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CourseSummary {
    pub id: i64,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub shortname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LmsRole {
    #[serde(default)]
    pub shortname: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LmsUser {
    pub id: i64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<LmsRole>,
}

impl LmsUser {
    pub fn fullname(&self) -> String {
        format!("{} {}", self.firstname, self.lastname).trim().to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════

/// Source of course material for ingestion.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Sections of a course, in platform order.
    async fn get_course_contents(&self, course_id: i64) -> Result<Vec<CourseSection>>;

    /// Fetch an attachment. Any failure yields `None`.
    async fn download_file(&self, url: &str) -> Option<Vec<u8>>;

    /// Courses visible to the configured account.
    async fn get_courses(&self) -> Result<Vec<CourseSummary>>;
}

/// Student identity and grade data held by the platform.
#[async_trait]
pub trait GradeSource: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<LmsUser>>;

    /// Quiz grades for one student in one course, as percentages in `[0, 100]`.
    async fn get_quiz_grades(&self, course_id: i64, user_id: i64) -> Result<Vec<(String, f64)>>;

    async fn get_enrolled_users(&self, course_id: i64) -> Result<Vec<LmsUser>>;
}

/// Both platform capabilities, backed by the same client.
#[derive(Clone)]
pub struct LmsHandles {
    pub content: Arc<dyn ContentSource>,
    pub grades: Arc<dyn GradeSource>,
}

/// Build the platform client selected by `[lms]`.
pub fn create_lms(config: &LmsConfig) -> Result<LmsHandles> {
    if config.mock {
        info!("using offline mock course source");
        let mock = Arc::new(MockContentSource);
        return Ok(LmsHandles {
            content: mock.clone(),
            grades: mock,
        });
    }

    let url = config
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("lms.url is required unless lms.mock = true"))?;
    let token = config
        .resolved_token()
        .ok_or_else(|| anyhow::anyhow!("lms.token or MOODLE_TOKEN must be set"))?;
    let client = Arc::new(MoodleClient::new(&url, &token)?);
    Ok(LmsHandles {
        content: client.clone(),
        grades: client,
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Moodle REST client
// ═══════════════════════════════════════════════════════════════════════

pub struct MoodleClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CoursesByField {
    #[serde(default)]
    courses: Vec<CourseSummary>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<LmsUser>,
}

#[derive(Debug, Deserialize)]
struct GradeReport {
    #[serde(default)]
    usergrades: Vec<UserGrades>,
}

#[derive(Debug, Deserialize)]
struct UserGrades {
    #[serde(default)]
    gradeitems: Vec<GradeItem>,
}

#[derive(Debug, Deserialize)]
struct GradeItem {
    #[serde(default)]
    itemname: Option<String>,
    #[serde(default)]
    itemtype: Option<String>,
    #[serde(default)]
    itemmodule: Option<String>,
    #[serde(default)]
    percentageformatted: Option<serde_json::Value>,
    #[serde(default)]
    gradeformatted: Option<serde_json::Value>,
}

impl GradeItem {
    fn is_quiz(&self) -> bool {
        self.itemtype.as_deref() == Some("mod") && self.itemmodule.as_deref() == Some("quiz")
    }

    /// Percentage column first, then the formatted grade.
    fn score(&self) -> f64 {
        let non_empty = |v: &&serde_json::Value| match v {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            _ => true,
        };
        self.percentageformatted
            .as_ref()
            .filter(non_empty)
            .or(self.gradeformatted.as_ref().filter(non_empty))
            .map(grades::parse_grade_value)
            .unwrap_or(0.0)
    }
}

impl MoodleClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("course-tutor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn rest_endpoint(&self) -> String {
        format!("{}/webservice/rest/server.php", self.base_url)
    }

    /// Call a web-service function and decode its JSON result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let mut form: Vec<(String, String)> = vec![
            ("wstoken".to_string(), self.token.clone()),
            ("wsfunction".to_string(), function.to_string()),
            ("moodlewsrestformat".to_string(), "json".to_string()),
        ];
        form.extend(params.iter().cloned());

        debug!(function, "calling Moodle web service");
        let response = self
            .client
            .post(self.rest_endpoint())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .with_context(|| format!("Moodle request {} failed", function))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Moodle {} returned {}: {}", function, status, body);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("Moodle {} returned invalid JSON", function))?;
        check_exception(function, &json)?;

        serde_json::from_value(json)
            .with_context(|| format!("Unexpected response shape from Moodle {}", function))
    }

    fn file_url_with_token(&self, url: &str) -> String {
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", url, sep, self.token)
    }
}

/// Moodle signals errors in-band as `{exception, errorcode, message}`.
fn check_exception(function: &str, json: &serde_json::Value) -> Result<()> {
    if let Some(obj) = json.as_object() {
        if obj.contains_key("exception") || obj.contains_key("errorcode") {
            let code = obj
                .get("errorcode")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let message = obj
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("no message");
            bail!("Moodle {} failed ({}): {}", function, code, message);
        }
    }
    Ok(())
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl ContentSource for MoodleClient {
    async fn get_course_contents(&self, course_id: i64) -> Result<Vec<CourseSection>> {
        self.call("core_course_get_contents", &[param("courseid", course_id)])
            .await
    }

    async fn download_file(&self, url: &str) -> Option<Vec<u8>> {
        if url.is_empty() {
            return None;
        }
        debug!(url, "downloading file from Moodle");
        let result = async {
            let response = self
                .client
                .get(self.file_url_with_token(url))
                .send()
                .await?
                .error_for_status()?;
            response.bytes().await
        }
        .await;

        match result {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!(url, error = %e, "file download failed");
                None
            }
        }
    }

    async fn get_courses(&self) -> Result<Vec<CourseSummary>> {
        let courses = match self.call::<Vec<CourseSummary>>(COURSES_PRIMARY, &[]).await {
            Ok(courses) => courses,
            Err(primary_err) => {
                warn!(
                    error = %primary_err,
                    "{} failed, falling back to {}",
                    COURSES_PRIMARY,
                    COURSES_SECONDARY
                );
                let by_field: CoursesByField = self
                    .call(COURSES_SECONDARY, &[])
                    .await
                    .with_context(|| format!("{} and {} both failed", COURSES_PRIMARY, COURSES_SECONDARY))?;
                by_field.courses
            }
        };
        // The front page is reported as a course with format "site".
        Ok(courses
            .into_iter()
            .filter(|c| c.format.as_deref() != Some("site"))
            .collect())
    }
}

#[async_trait]
impl GradeSource for MoodleClient {
    async fn get_user(&self, user_id: i64) -> Result<Option<LmsUser>> {
        let response: UsersResponse = self
            .call(
                "core_user_get_users",
                &[
                    param("criteria[0][key]", "id"),
                    param("criteria[0][value]", user_id),
                ],
            )
            .await?;
        Ok(response.users.into_iter().next())
    }

    async fn get_quiz_grades(&self, course_id: i64, user_id: i64) -> Result<Vec<(String, f64)>> {
        let report: GradeReport = self
            .call(
                "gradereport_user_get_grade_items",
                &[param("courseid", course_id), param("userid", user_id)],
            )
            .await?;

        let Some(user) = report.usergrades.into_iter().next() else {
            return Ok(Vec::new());
        };
        Ok(user
            .gradeitems
            .iter()
            .filter(|item| item.is_quiz())
            .map(|item| {
                let name = item
                    .itemname
                    .clone()
                    .unwrap_or_else(|| "Unknown Quiz".to_string());
                (name, item.score())
            })
            .collect())
    }

    async fn get_enrolled_users(&self, course_id: i64) -> Result<Vec<LmsUser>> {
        self.call(
            "core_enrol_get_enrolled_users",
            &[param("courseid", course_id)],
        )
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Offline mock
// ═══════════════════════════════════════════════════════════════════════

/// Fixed course tree for development without a Moodle site.
pub struct MockContentSource;

impl MockContentSource {
    pub fn sections() -> Vec<CourseSection> {
        vec![CourseSection {
            name: Some("Week 1: Basics".to_string()),
            modules: vec![
                CourseModule {
                    name: Some("What is AI?".to_string()),
                    modname: Some("page".to_string()),
                    contents: vec![ModuleContent {
                        filename: Some("intro.pdf".to_string()),
                        fileurl: Some("http://mock/file.pdf".to_string()),
                        ..ModuleContent::default()
                    }],
                    ..CourseModule::default()
                },
                CourseModule {
                    name: Some("Quiz 1".to_string()),
                    modname: Some("quiz".to_string()),
                    ..CourseModule::default()
                },
            ],
        }]
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    async fn get_course_contents(&self, course_id: i64) -> Result<Vec<CourseSection>> {
        debug!(course_id, "serving mock course contents");
        Ok(Self::sections())
    }

    async fn download_file(&self, _url: &str) -> Option<Vec<u8>> {
        None
    }

    async fn get_courses(&self) -> Result<Vec<CourseSummary>> {
        Ok(vec![
            CourseSummary {
                id: 1,
                fullname: "Introduction to AI".to_string(),
                shortname: "AI-101".to_string(),
                format: None,
            },
            CourseSummary {
                id: 2,
                fullname: "Advanced Python".to_string(),
                shortname: "PY-201".to_string(),
                format: None,
            },
        ])
    }
}

#[async_trait]
impl GradeSource for MockContentSource {
    async fn get_user(&self, user_id: i64) -> Result<Option<LmsUser>> {
        Ok(Some(LmsUser {
            id: user_id,
            firstname: "Mock".to_string(),
            lastname: format!("Student {}", user_id),
            email: None,
            roles: Vec::new(),
        }))
    }

    async fn get_quiz_grades(&self, _course_id: i64, _user_id: i64) -> Result<Vec<(String, f64)>> {
        Ok(Vec::new())
    }

    async fn get_enrolled_users(&self, _course_id: i64) -> Result<Vec<LmsUser>> {
        let student = |id: i64| LmsUser {
            id,
            firstname: "Mock".to_string(),
            lastname: format!("Student {}", id),
            email: None,
            roles: vec![LmsRole {
                shortname: "student".to_string(),
            }],
        };
        Ok(vec![
            student(1),
            student(2),
            LmsUser {
                id: 99,
                firstname: "Mock".to_string(),
                lastname: "Teacher".to_string(),
                email: None,
                roles: vec![LmsRole {
                    shortname: "editingteacher".to_string(),
                }],
            },
        ])
    }
}

use serde::Deserialize;

/// Request body for trainee sign-up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub courses_interested: Vec<String>,
    #[serde(default)]
    pub courses_other: Vec<String>,
    pub interested_in_certification: bool,
    pub training_attended: Option<bool>,
    pub mobile_number: Option<String>,
    pub grade_teach: Option<String>,
    pub years_experience: Option<i32>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

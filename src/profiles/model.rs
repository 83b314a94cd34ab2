use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Answers collected by the onboarding questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingQuestions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,
}

impl OnboardingQuestions {
    /// Overwrites only the answers present in `other`.
    pub fn merge(&mut self, other: &OnboardingQuestions) {
        if let Some(goal) = &other.goal {
            self.goal = Some(goal.clone());
        }
        if let Some(level) = &other.language_level {
            self.language_level = Some(level.clone());
        }
        if let Some(commitment) = &other.commitment {
            self.commitment = Some(commitment.clone());
        }
    }
}

/// A user's profile, linked to the identity provider by `subject_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub subject_id: String,
    pub email: String,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub onboarding_completed: bool,
    pub onboarding_questions: Option<OnboardingQuestions>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Profile {
    /// Applies the allow-listed fields of `patch`. Does not touch `updated_at`.
    /// Display names are trimmed and a blank one clears the field.
    pub fn apply_patch(&mut self, patch: &ProfilePatch) {
        if let Some(v) = &patch.user_name {
            self.user_name = non_blank(Some(v.as_str()));
        }
        if let Some(v) = &patch.first_name {
            self.first_name = non_blank(Some(v.as_str()));
        }
        if let Some(v) = &patch.last_name {
            self.last_name = non_blank(Some(v.as_str()));
        }
        // completion is one-way
        if let Some(done) = patch.onboarding_completed {
            self.onboarding_completed |= done;
        }
        if let Some(answers) = &patch.onboarding_questions {
            self.onboarding_questions
                .get_or_insert_with(OnboardingQuestions::default)
                .merge(answers);
        }
    }
}

/// Profile attributes asserted by the identity provider at sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl IdentityClaims {
    /// The display attributes of the claims, as a patch.
    pub fn display_patch(&self) -> ProfilePatch {
        ProfilePatch {
            user_name: non_blank(self.user_name.as_deref()),
            first_name: non_blank(self.first_name.as_deref()),
            last_name: non_blank(self.last_name.as_deref()),
            ..ProfilePatch::default()
        }
    }
}

/// Row to insert, fully formed by the service.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub subject_id: String,
    pub email: String,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<NewProfile> for Profile {
    fn from(n: NewProfile) -> Self {
        Self {
            id: n.id,
            subject_id: n.subject_id,
            email: n.email,
            user_name: n.user_name,
            first_name: n.first_name,
            last_name: n.last_name,
            onboarding_completed: false,
            onboarding_questions: None,
            created_at: n.created_at,
            updated_at: n.created_at,
        }
    }
}

/// The fields a client may change through a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    UserName,
    FirstName,
    LastName,
    OnboardingCompleted,
    OnboardingQuestions,
}

impl ProfileField {
    pub const ALL: [ProfileField; 5] = [
        ProfileField::UserName,
        ProfileField::FirstName,
        ProfileField::LastName,
        ProfileField::OnboardingCompleted,
        ProfileField::OnboardingQuestions,
    ];

    pub fn json_key(self) -> &'static str {
        match self {
            ProfileField::UserName => "userName",
            ProfileField::FirstName => "firstName",
            ProfileField::LastName => "lastName",
            ProfileField::OnboardingCompleted => "onboardingCompleted",
            ProfileField::OnboardingQuestions => "onboardingQuestions",
        }
    }
}

/// Partial update of a profile. Only allow-listed fields exist here;
/// any other key in an incoming body is dropped during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub onboarding_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_questions: Option<OnboardingQuestions>,
}

impl ProfilePatch {
    pub fn fields(&self) -> Vec<ProfileField> {
        ProfileField::ALL
            .into_iter()
            .filter(|f| match f {
                ProfileField::UserName => self.user_name.is_some(),
                ProfileField::FirstName => self.first_name.is_some(),
                ProfileField::LastName => self.last_name.is_some(),
                ProfileField::OnboardingCompleted => self.onboarding_completed.is_some(),
                ProfileField::OnboardingQuestions => self.onboarding_questions.is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().map_or(true, |f| f != 0.0))),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Some(false)),
            other => Err(D::Error::custom(format!(
                "onboardingCompleted: cannot interpret `{other}` as a boolean"
            ))),
        },
        Some(_) => Err(D::Error::custom(
            "onboardingCompleted: expected a boolean",
        )),
    }
}

pub(crate) fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Profile {
        let now = OffsetDateTime::now_utc();
        Profile {
            id: Uuid::new_v4(),
            subject_id: "user_1".into(),
            email: "a@x.com".into(),
            user_name: None,
            first_name: Some("Ana".into()),
            last_name: None,
            onboarding_completed: false,
            onboarding_questions: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn patch_drops_unknown_and_server_owned_keys() {
        let patch: ProfilePatch = serde_json::from_value(json!({
            "firstName": "Ivo",
            "email": "evil@x.com",
            "subjectId": "someone_else",
            "id": "00000000-0000-0000-0000-000000000000",
            "isAdmin": true
        }))
        .expect("patch");
        assert_eq!(patch.fields(), vec![ProfileField::FirstName]);
        assert_eq!(patch.first_name.as_deref(), Some("Ivo"));
    }

    #[test]
    fn patch_without_allow_listed_fields_is_empty() {
        let patch: ProfilePatch =
            serde_json::from_value(json!({ "notAllowListedField": "x" })).expect("patch");
        assert!(patch.is_empty());
    }

    #[test]
    fn onboarding_completed_is_coerced() {
        let cases = [
            (json!(true), Some(true)),
            (json!("true"), Some(true)),
            (json!("YES"), Some(true)),
            (json!(1), Some(true)),
            (json!(0), Some(false)),
            (json!("false"), Some(false)),
            (json!(null), None),
        ];
        for (value, expected) in cases {
            let patch: ProfilePatch =
                serde_json::from_value(json!({ "onboardingCompleted": value.clone() }))
                    .expect("patch");
            assert_eq!(patch.onboarding_completed, expected, "input {value}");
        }

        assert!(serde_json::from_value::<ProfilePatch>(json!({ "onboardingCompleted": "maybe" })).is_err());
        assert!(serde_json::from_value::<ProfilePatch>(json!({ "onboardingCompleted": [true] })).is_err());
    }

    #[test]
    fn completion_never_resets() {
        let mut p = sample();
        p.apply_patch(&ProfilePatch {
            onboarding_completed: Some(true),
            ..Default::default()
        });
        assert!(p.onboarding_completed);
        p.apply_patch(&ProfilePatch {
            onboarding_completed: Some(false),
            ..Default::default()
        });
        assert!(p.onboarding_completed);
    }

    #[test]
    fn onboarding_answers_merge_per_field() {
        let mut p = sample();
        p.apply_patch(&ProfilePatch {
            onboarding_questions: Some(OnboardingQuestions {
                goal: Some("travel".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        p.apply_patch(&ProfilePatch {
            onboarding_questions: Some(OnboardingQuestions {
                language_level: Some("A2".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(
            p.onboarding_questions,
            Some(OnboardingQuestions {
                goal: Some("travel".into()),
                language_level: Some("A2".into()),
                commitment: None,
            })
        );
    }

    #[test]
    fn profile_serializes_camel_case_with_rfc3339_timestamps() {
        let p = sample();
        let v = serde_json::to_value(&p).expect("json");
        assert_eq!(v["subjectId"], "user_1");
        assert_eq!(v["onboardingCompleted"], false);
        assert!(v["createdAt"].as_str().expect("string").contains('T'));
        let back: Profile = serde_json::from_value(v).expect("parse");
        assert_eq!(back.id, p.id);
    }

    #[test]
    fn blank_display_names_in_patch_are_stored_as_absent() {
        let mut profile = sample();
        profile.user_name = Some("ana".into());
        let patch: ProfilePatch = serde_json::from_value(json!({
            "firstName": "",
            "userName": "   ",
            "lastName": " Horvat "
        }))
        .expect("patch");
        profile.apply_patch(&patch);
        assert_eq!(profile.first_name, None);
        assert_eq!(profile.user_name, None);
        assert_eq!(profile.last_name.as_deref(), Some("Horvat"));
    }

    #[test]
    fn display_patch_skips_blank_claims() {
        let claims = IdentityClaims {
            email: Some("a@x.com".into()),
            user_name: Some("  ".into()),
            first_name: Some(" Ana ".into()),
            last_name: None,
        };
        let patch = claims.display_patch();
        assert_eq!(patch.fields(), vec![ProfileField::FirstName]);
        assert_eq!(patch.first_name.as_deref(), Some("Ana"));
    }
}

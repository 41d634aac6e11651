use serde::{Deserialize, Serialize};

/// Capability tier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    #[default]
    #[serde(rename = "student")]
    Learner,
    #[serde(rename = "instructor")]
    Instructor,
    #[serde(rename = "admin")]
    Administrator,
}

impl Role {
    /// Get the display name for this role.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Learner => "Learner",
            Role::Instructor => "Instructor",
            Role::Administrator => "Administrator",
        }
    }
}

/// Identity record of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "avatar", default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl User {
    /// Up to two upper-case initials taken from the display name, for avatar fallbacks.
    pub fn initials(&self) -> String {
        self.display_name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_wire_format() {
        let json = r#"{"id":"user-1","name":"John Doe","email":"john.doe@example.com","avatar":"https://img.example.com/u/1","role":"student"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");

        assert_eq!(user.id, "user-1");
        assert_eq!(user.display_name, "John Doe");
        assert_eq!(user.avatar_ref.as_deref(), Some("https://img.example.com/u/1"));
        assert_eq!(user.role, Role::Learner);
    }

    #[test]
    fn test_user_missing_optional_fields() {
        let json = r#"{"id":"7","name":"Ada","email":"ada@example.com"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.avatar_ref, None);
        assert_eq!(user.role, Role::Learner);
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Administrator).unwrap(), r#""admin""#);
        assert_eq!(serde_json::to_string(&Role::Instructor).unwrap(), r#""instructor""#);
        assert!(serde_json::from_str::<Role>(r#""superuser""#).is_err());
    }

    #[test]
    fn test_initials() {
        let mut user = User {
            id: "1".to_string(),
            display_name: "john ronald doe".to_string(),
            email: "j@example.com".to_string(),
            avatar_ref: None,
            role: Role::Learner,
        };
        assert_eq!(user.initials(), "JR");

        user.display_name = "Cher".to_string();
        assert_eq!(user.initials(), "C");

        user.display_name = "   ".to_string();
        assert_eq!(user.initials(), "");
    }
}

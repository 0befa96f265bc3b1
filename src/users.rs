use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::issue_token;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{gravatar_url, now, ok_json, sanitize_text, ApiResponse};
use crate::core::store::Db;
use crate::core::validate::{Checks, Validate};
use crate::handlers::{App, Call};
use crate::models::models::{Id, User};

pub fn find_by_id(db: &Db, id: &Id) -> anyhow::Result<Option<User>> {
    db.get_json(&user_key(id))
}

pub fn find_by_email(db: &Db, email: &str) -> anyhow::Result<Option<User>> {
    match db.get_json::<Id>(&email_key(email))? {
        Some(id) => find_by_id(db, &id),
        None => Ok(None),
    }
}

pub fn insert(db: &Db, user: &User) -> anyhow::Result<()> {
    db.set_json(&user_key(&user.id), user)?;
    db.set_json(&email_key(&user.email), &user.id)?;
    db.update_list(USERS_LIST_KEY, |ids: &mut Vec<Id>| ids.push(user.id))
}

/// Removes the account record and its email index. Posts are left alone.
pub fn remove(db: &Db, user: &User) -> anyhow::Result<()> {
    db.delete(&user_key(&user.id))?;
    db.delete(&email_key(&user.email))?;
    db.update_list(USERS_LIST_KEY, |ids: &mut Vec<Id>| ids.retain(|id| *id != user.id))
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterForm {
    type Valid = Registration;

    fn validate(self) -> Result<Registration, ApiError> {
        let mut checks = Checks::new();
        let name = self.name.map(|name| sanitize_text(&name));
        let name = checks.required("name", name.as_deref(), "Name is required");
        checks.max_len("name", name.as_deref(), MAX_NAME_LENGTH, "Name is too long");
        let email = checks.email("email", self.email.as_deref(), "Please include a valid email");
        let long_enough = checks.min_len(
            "password",
            self.password.as_deref(),
            MIN_PASSWORD_LENGTH,
            "Please enter a password with 6 or more characters",
        );
        checks.finish()?;

        match (name, email, self.password) {
            (Some(name), Some(email), Some(password)) if long_enough => Ok(Registration {
                name,
                email,
                password,
            }),
            _ => Err(ApiError::validation("body", "Invalid registration")),
        }
    }
}

// POST /users
pub fn register(app: &App, call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    let registration = call.form::<RegisterForm>()?;
    let db = app.db();

    if find_by_email(db, &registration.email)?.is_some() {
        return Err(ApiError::UserExists);
    }

    let user = User {
        id: Id::new(),
        name: registration.name,
        avatar: gravatar_url(&registration.email),
        email: registration.email,
        password: app.hashing().hash(&registration.password)?,
        date: now(),
    };
    insert(db, &user)?;
    info!(user_id = %user.id, "registered user");

    let token = issue_token(app, user.id)?;
    Ok(ok_json(&json!({ "token": token }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str) -> User {
        User {
            id: Id::new(),
            name: "Grace".to_string(),
            email: email.to_string(),
            password: "hash".to_string(),
            avatar: gravatar_url(email),
            date: now(),
        }
    }

    #[test]
    fn insert_indexes_by_email_and_remove_clears_it() {
        let db = Db::in_memory();
        let grace = user("grace@navy.mil");
        insert(&db, &grace).unwrap();

        assert_eq!(find_by_email(&db, "grace@navy.mil").unwrap().unwrap().id, grace.id);
        assert_eq!(db.list::<Id>(USERS_LIST_KEY).unwrap(), vec![grace.id]);

        remove(&db, &grace).unwrap();
        assert!(find_by_email(&db, "grace@navy.mil").unwrap().is_none());
        assert!(find_by_id(&db, &grace.id).unwrap().is_none());
        assert!(db.list::<Id>(USERS_LIST_KEY).unwrap().is_empty());
    }

    #[test]
    fn short_password_is_rejected() {
        let form = RegisterForm {
            name: Some("Grace".into()),
            email: Some("grace@navy.mil".into()),
            password: Some("12345".into()),
        };
        match form.validate() {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].param, "password");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn registration_normalizes_email_and_strips_markup() {
        let form = RegisterForm {
            name: Some("<b>Grace</b>".into()),
            email: Some("Grace@Navy.mil".into()),
            password: Some("cobol-rules".into()),
        };
        let reg = form.validate().unwrap();
        assert_eq!(reg.name, "Grace");
        assert_eq!(reg.email, "grace@navy.mil");
    }

    #[test]
    fn name_keeps_ampersands_verbatim() {
        let form = RegisterForm {
            name: Some("AT&T Fan".into()),
            email: Some("fan@example.com".into()),
            password: Some("secret123".into()),
        };
        assert_eq!(form.validate().unwrap().name, "AT&T Fan");
    }
}

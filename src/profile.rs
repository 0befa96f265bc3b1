use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::Identity;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{now, ok_json, sanitize_text, ApiResponse};
use crate::core::store::Db;
use crate::core::validate::{non_blank, Checks, Validate};
use crate::handlers::{App, Call};
use crate::models::models::{Education, Experience, Id, Owner, Profile, ProfileView, Social};
use crate::users;

const NO_PROFILE: &str = "There is no profile for this user";

pub fn find(db: &Db, user_id: &Id) -> anyhow::Result<Option<Profile>> {
    db.get_json(&profile_key(user_id))
}

fn own_profile(db: &Db, identity: Identity) -> Result<Profile, ApiError> {
    find(db, &identity.user_id)?.ok_or(ApiError::NotFound(NO_PROFILE))
}

fn save(db: &Db, profile: &Profile) -> anyhow::Result<()> {
    db.set_json(&profile_key(&profile.user), profile)
}

fn view(db: &Db, profile: Profile) -> anyhow::Result<ProfileView> {
    let owner = users::find_by_id(db, &profile.user)?.map(|user| Owner {
        id: user.id,
        name: user.name,
        avatar: user.avatar,
    });
    Ok(ProfileView { profile, owner })
}

// === Profile fields ===

/// Skills arrive either as "a, b, c" or as a JSON list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SkillsInput {
    Csv(String),
    List(Vec<String>),
}

impl SkillsInput {
    fn into_list(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            SkillsInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
            SkillsInput::List(list) => list,
        };
        raw.into_iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    company: Option<String>,
    website: Option<String>,
    location: Option<String>,
    status: Option<String>,
    skills: Option<SkillsInput>,
    bio: Option<String>,
    githubusername: Option<String>,
    youtube: Option<String>,
    twitter: Option<String>,
    facebook: Option<String>,
    linkedin: Option<String>,
    instagram: Option<String>,
}

#[derive(Debug)]
pub struct ProfileFields {
    pub company: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub status: String,
    pub skills: Vec<String>,
    pub bio: Option<String>,
    pub githubusername: Option<String>,
    pub social: Social,
}

impl Validate for ProfileForm {
    type Valid = ProfileFields;

    fn validate(self) -> Result<ProfileFields, ApiError> {
        let mut checks = Checks::new();
        let status = checks.required("status", self.status.as_deref(), "Status is required");
        let skills = self.skills.map(SkillsInput::into_list).unwrap_or_default();
        if skills.is_empty() {
            checks.fail("skills", "Skills is required");
        }
        checks.finish()?;

        let status = status.ok_or_else(|| ApiError::validation("status", "Status is required"))?;
        Ok(ProfileFields {
            company: non_blank(self.company),
            website: non_blank(self.website),
            location: non_blank(self.location),
            status,
            skills,
            bio: non_blank(self.bio).map(|bio| sanitize_text(&bio)),
            githubusername: non_blank(self.githubusername),
            social: Social {
                youtube: non_blank(self.youtube),
                twitter: non_blank(self.twitter),
                facebook: non_blank(self.facebook),
                linkedin: non_blank(self.linkedin),
                instagram: non_blank(self.instagram),
            },
        })
    }
}

impl ProfileFields {
    /// Supplied fields overwrite, absent ones keep their value; the social
    /// links are replaced as a whole.
    fn apply(self, profile: &mut Profile) {
        profile.status = self.status;
        profile.skills = self.skills;
        profile.social = self.social;
        if self.company.is_some() {
            profile.company = self.company;
        }
        if self.website.is_some() {
            profile.website = self.website;
        }
        if self.location.is_some() {
            profile.location = self.location;
        }
        if self.bio.is_some() {
            profile.bio = self.bio;
        }
        if self.githubusername.is_some() {
            profile.githubusername = self.githubusername;
        }
    }

    fn into_profile(self, user: Id) -> Profile {
        let mut profile = Profile {
            id: Id::new(),
            user,
            company: None,
            website: None,
            location: None,
            status: String::new(),
            skills: Vec::new(),
            bio: None,
            githubusername: None,
            social: Social::default(),
            experience: Vec::new(),
            education: Vec::new(),
            date: now(),
        };
        self.apply(&mut profile);
        profile
    }
}

// === Experience / education entries ===

#[derive(Debug, Default, Deserialize)]
pub struct ExperienceForm {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    from: Option<String>,
    to: Option<String>,
    current: Option<bool>,
    description: Option<String>,
}

impl Validate for ExperienceForm {
    type Valid = Experience;

    fn validate(self) -> Result<Experience, ApiError> {
        let mut checks = Checks::new();
        let title = checks.required("title", self.title.as_deref(), "Title is required");
        let company = checks.required("company", self.company.as_deref(), "Company is required");
        let from = checks.required_date("from", self.from.as_deref(), "From date is required");
        let to = checks.optional_date("to", self.to.as_deref());
        checks.finish()?;

        match (title, company, from) {
            (Some(title), Some(company), Some(from)) => Ok(Experience {
                id: Id::new(),
                title,
                company,
                location: non_blank(self.location),
                from,
                to,
                current: self.current.unwrap_or(false),
                description: non_blank(self.description).map(|d| sanitize_text(&d)),
            }),
            _ => Err(ApiError::validation("body", "Invalid experience")),
        }
    }
}

/// Partial update of an experience entry.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct ExperiencePatch(ExperienceForm);

#[derive(Debug, Default)]
pub struct ExperienceChanges {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    current: Option<bool>,
    description: Option<String>,
}

impl Validate for ExperiencePatch {
    type Valid = ExperienceChanges;

    fn validate(self) -> Result<ExperienceChanges, ApiError> {
        let form = self.0;
        let mut checks = Checks::new();
        let title = supplied(&mut checks, "title", form.title, "Title cannot be empty");
        let company = supplied(&mut checks, "company", form.company, "Company cannot be empty");
        let from = checks.optional_date("from", form.from.as_deref());
        let to = checks.optional_date("to", form.to.as_deref());
        checks.finish()?;

        Ok(ExperienceChanges {
            title,
            company,
            location: non_blank(form.location),
            from,
            to,
            current: form.current,
            description: non_blank(form.description).map(|d| sanitize_text(&d)),
        })
    }
}

impl ExperienceChanges {
    fn apply(self, entry: &mut Experience) {
        if let Some(title) = self.title {
            entry.title = title;
        }
        if let Some(company) = self.company {
            entry.company = company;
        }
        if self.location.is_some() {
            entry.location = self.location;
        }
        if let Some(from) = self.from {
            entry.from = from;
        }
        if self.to.is_some() {
            entry.to = self.to;
        }
        if let Some(current) = self.current {
            entry.current = current;
        }
        if self.description.is_some() {
            entry.description = self.description;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EducationForm {
    school: Option<String>,
    degree: Option<String>,
    fieldofstudy: Option<String>,
    from: Option<String>,
    to: Option<String>,
    current: Option<bool>,
    description: Option<String>,
}

impl Validate for EducationForm {
    type Valid = Education;

    fn validate(self) -> Result<Education, ApiError> {
        let mut checks = Checks::new();
        let school = checks.required("school", self.school.as_deref(), "School is required");
        let degree = checks.required("degree", self.degree.as_deref(), "Degree is required");
        let fieldofstudy = checks.required(
            "fieldofstudy",
            self.fieldofstudy.as_deref(),
            "Field of study is required",
        );
        let from = checks.required_date("from", self.from.as_deref(), "From date is required");
        let to = checks.optional_date("to", self.to.as_deref());
        checks.finish()?;

        match (school, degree, fieldofstudy, from) {
            (Some(school), Some(degree), Some(fieldofstudy), Some(from)) => Ok(Education {
                id: Id::new(),
                school,
                degree,
                fieldofstudy,
                from,
                to,
                current: self.current.unwrap_or(false),
                description: non_blank(self.description).map(|d| sanitize_text(&d)),
            }),
            _ => Err(ApiError::validation("body", "Invalid education")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct EducationPatch(EducationForm);

#[derive(Debug, Default)]
pub struct EducationChanges {
    school: Option<String>,
    degree: Option<String>,
    fieldofstudy: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    current: Option<bool>,
    description: Option<String>,
}

impl Validate for EducationPatch {
    type Valid = EducationChanges;

    fn validate(self) -> Result<EducationChanges, ApiError> {
        let form = self.0;
        let mut checks = Checks::new();
        let school = supplied(&mut checks, "school", form.school, "School cannot be empty");
        let degree = supplied(&mut checks, "degree", form.degree, "Degree cannot be empty");
        let fieldofstudy = supplied(
            &mut checks,
            "fieldofstudy",
            form.fieldofstudy,
            "Field of study cannot be empty",
        );
        let from = checks.optional_date("from", form.from.as_deref());
        let to = checks.optional_date("to", form.to.as_deref());
        checks.finish()?;

        Ok(EducationChanges {
            school,
            degree,
            fieldofstudy,
            from,
            to,
            current: form.current,
            description: non_blank(form.description).map(|d| sanitize_text(&d)),
        })
    }
}

impl EducationChanges {
    fn apply(self, entry: &mut Education) {
        if let Some(school) = self.school {
            entry.school = school;
        }
        if let Some(degree) = self.degree {
            entry.degree = degree;
        }
        if let Some(fieldofstudy) = self.fieldofstudy {
            entry.fieldofstudy = fieldofstudy;
        }
        if let Some(from) = self.from {
            entry.from = from;
        }
        if self.to.is_some() {
            entry.to = self.to;
        }
        if let Some(current) = self.current {
            entry.current = current;
        }
        if self.description.is_some() {
            entry.description = self.description;
        }
    }
}

/// A required field in a partial update: absent is fine, blank is not.
fn supplied(checks: &mut Checks, param: &str, value: Option<String>, msg: &str) -> Option<String> {
    let value = value?;
    checks.required(param, Some(value.as_str()), msg)
}

// === Handlers ===

// GET /profile/me
pub fn get_own_profile(app: &App, _call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let profile = own_profile(app.db(), identity)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// POST /profile
pub fn upsert_profile(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let fields = call.form::<ProfileForm>()?;
    let db = app.db();

    let profile = match find(db, &identity.user_id)? {
        Some(mut existing) => {
            fields.apply(&mut existing);
            save(db, &existing)?;
            existing
        }
        None => {
            let created = fields.into_profile(identity.user_id);
            save(db, &created)?;
            db.update_list(PROFILES_LIST_KEY, |ids: &mut Vec<Id>| ids.push(created.user))?;
            info!(user_id = %identity.user_id, "created profile");
            created
        }
    };

    Ok(ok_json(&view(db, profile)?)?)
}

// GET /profile
pub fn list_profiles(app: &App, _call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    let db = app.db();
    let mut profiles = Vec::new();
    for user_id in db.list::<Id>(PROFILES_LIST_KEY)? {
        if let Some(profile) = find(db, &user_id)? {
            profiles.push(view(db, profile)?);
        }
    }
    Ok(ok_json(&profiles)?)
}

// GET /profile/user/:user_id
pub fn get_profile_by_user(app: &App, call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "Profile not found";
    let user_id = call.id_param("user_id", NOT_FOUND)?;
    let profile = find(app.db(), &user_id)?.ok_or(ApiError::NotFound(NOT_FOUND))?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// DELETE /profile
pub fn delete_account(app: &App, _call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let db = app.db();
    let user_id = identity.user_id;

    db.delete(&profile_key(&user_id))?;
    db.update_list(PROFILES_LIST_KEY, |ids: &mut Vec<Id>| ids.retain(|id| *id != user_id))?;
    if let Some(user) = users::find_by_id(db, &user_id)? {
        users::remove(db, &user)?;
    }
    info!(%user_id, "deleted account");

    Ok(ok_json(&json!({ "msg": "User deleted" }))?)
}

// PUT /profile/experience
pub fn add_experience(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let entry = call.form::<ExperienceForm>()?;
    let mut profile = own_profile(app.db(), identity)?;
    profile.experience.insert(0, entry);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// PUT /profile/experience/:exp_id
pub fn update_experience(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "Experience not found";
    let changes = call.form::<ExperiencePatch>()?;
    let entry_id = call.id_param("exp_id", NOT_FOUND)?;
    let mut profile = own_profile(app.db(), identity)?;

    let entry = profile
        .experience
        .iter_mut()
        .find(|e| e.id == entry_id)
        .ok_or(ApiError::NotFound(NOT_FOUND))?;
    changes.apply(entry);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// DELETE /profile/experience/:exp_id
pub fn remove_experience(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "Experience not found";
    let entry_id = call.id_param("exp_id", NOT_FOUND)?;
    let mut profile = own_profile(app.db(), identity)?;

    let index = profile
        .experience
        .iter()
        .position(|e| e.id == entry_id)
        .ok_or(ApiError::NotFound(NOT_FOUND))?;
    profile.experience.remove(index);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// PUT /profile/education
pub fn add_education(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let entry = call.form::<EducationForm>()?;
    let mut profile = own_profile(app.db(), identity)?;
    profile.education.insert(0, entry);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// PUT /profile/education/:edu_id
pub fn update_education(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "Education not found";
    let changes = call.form::<EducationPatch>()?;
    let entry_id = call.id_param("edu_id", NOT_FOUND)?;
    let mut profile = own_profile(app.db(), identity)?;

    let entry = profile
        .education
        .iter_mut()
        .find(|e| e.id == entry_id)
        .ok_or(ApiError::NotFound(NOT_FOUND))?;
    changes.apply(entry);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// DELETE /profile/education/:edu_id
pub fn remove_education(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "Education not found";
    let entry_id = call.id_param("edu_id", NOT_FOUND)?;
    let mut profile = own_profile(app.db(), identity)?;

    let index = profile
        .education
        .iter()
        .position(|e| e.id == entry_id)
        .ok_or(ApiError::NotFound(NOT_FOUND))?;
    profile.education.remove(index);
    save(app.db(), &profile)?;
    Ok(ok_json(&view(app.db(), profile)?)?)
}

// GET /profile/github/:username
pub fn github_repositories(app: &App, call: &Call<'_>) -> Result<ApiResponse, ApiError> {
    const NOT_FOUND: &str = "No Github profile found";
    let username = call.param("username").ok_or(ApiError::NotFound(NOT_FOUND))?;

    match app.repos().repositories(username) {
        Ok(Some(repos)) => Ok(ok_json(&repos)?),
        Ok(None) => Err(ApiError::NotFound(NOT_FOUND)),
        Err(e) => Err(ApiError::Upstream(format!("{e:#}"))),
    }
}

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::Identity;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{now, ok_json, sanitize_text, ApiResponse};
use crate::core::query_params::Page;
use crate::core::store::Db;
use crate::core::validate::{Checks, Validate};
use crate::handlers::{App, Call};
use crate::models::models::{Comment, Id, Post, User};
use crate::{ownership, users};

const POST_NOT_FOUND: &str = "Post not found";

pub fn find(db: &Db, id: &Id) -> anyhow::Result<Option<Post>> {
    db.get_json(&post_key(id))
}

fn load(db: &Db, call: &Call<'_>) -> Result<Post, ApiError> {
    let id = call.id_param("id", POST_NOT_FOUND)?;
    find(db, &id)?.ok_or(ApiError::NotFound(POST_NOT_FOUND))
}

fn save(db: &Db, post: &Post) -> anyhow::Result<()> {
    db.set_json(&post_key(&post.id), post)
}

fn author(db: &Db, identity: Identity) -> Result<User, ApiError> {
    users::find_by_id(db, &identity.user_id)?.ok_or(ApiError::NotFound("User not found"))
}

#[derive(Debug, Deserialize)]
pub struct PostForm {
    text: Option<String>,
}

impl Validate for PostForm {
    type Valid = String;

    fn validate(self) -> Result<String, ApiError> {
        validate_text(self.text, MAX_POST_LENGTH)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    text: Option<String>,
}

impl Validate for CommentForm {
    type Valid = String;

    fn validate(self) -> Result<String, ApiError> {
        validate_text(self.text, MAX_COMMENT_LENGTH)
    }
}

/// Sanitized, required, and capped at `max` chars as stored.
fn validate_text(text: Option<String>, max: usize) -> Result<String, ApiError> {
    let mut checks = Checks::new();
    let clean = text.map(|t| sanitize_text(&t));
    let text = checks.required("text", clean.as_deref(), "Text is required");
    checks.max_len("text", text.as_deref(), max, "Text is too long");
    checks.finish()?;
    text.ok_or_else(|| ApiError::validation("text", "Text is required"))
}

// POST /posts
pub fn create_post(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let text = call.form::<PostForm>()?;
    let db = app.db();
    let user = author(db, identity)?;

    let post = Post {
        id: Id::new(),
        user: user.id,
        text,
        name: user.name,
        avatar: user.avatar,
        likes: Vec::new(),
        comments: Vec::new(),
        date: now(),
    };

    save(db, &post)?;
    // newest first
    db.update_list(FEED_KEY, |feed: &mut Vec<Id>| feed.insert(0, post.id))?;
    info!(post_id = %post.id, user_id = %post.user, "created post");

    Ok(ok_json(&post)?)
}

// GET /posts
pub fn list_posts(app: &App, call: &Call<'_>, _identity: Identity) -> Result<ApiResponse, ApiError> {
    let db = app.db();
    let feed: Vec<Id> = db.list(FEED_KEY)?;

    let ids: Vec<Id> = match Page::from_params(&call.query()) {
        Some(page) => feed.into_iter().skip(page.offset()).take(page.limit).collect(),
        None => feed,
    };

    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(post) = find(db, &id)? {
            posts.push(post);
        }
    }

    Ok(ok_json(&posts)?)
}

// GET /posts/:id
pub fn get_post(app: &App, call: &Call<'_>, _identity: Identity) -> Result<ApiResponse, ApiError> {
    Ok(ok_json(&load(app.db(), call)?)?)
}

// DELETE /posts/:id
pub fn delete_post(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let db = app.db();
    let post = load(db, call)?;
    ownership::ensure_owner(identity.user_id, post.user)?;

    db.delete(&post_key(&post.id))?;
    db.update_list(FEED_KEY, |feed: &mut Vec<Id>| feed.retain(|id| *id != post.id))?;
    info!(post_id = %post.id, "deleted post");

    Ok(ok_json(&json!({ "msg": "Post removed" }))?)
}

// PUT /posts/like/:id
pub fn like_post(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let mut post = load(app.db(), call)?;
    ownership::like(&mut post, identity.user_id)?;
    save(app.db(), &post)?;
    Ok(ok_json(&post.likes)?)
}

// PUT /posts/unlike/:id
pub fn unlike_post(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let mut post = load(app.db(), call)?;
    ownership::unlike(&mut post, identity.user_id)?;
    save(app.db(), &post)?;
    Ok(ok_json(&post.likes)?)
}

// POST /posts/comment/:id
pub fn add_comment(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    let text = call.form::<CommentForm>()?;
    let db = app.db();
    let mut post = load(db, call)?;
    let user = author(db, identity)?;

    post.comments.insert(
        0,
        Comment {
            id: Id::new(),
            user: user.id,
            text,
            name: user.name,
            avatar: user.avatar,
            date: now(),
        },
    );
    save(db, &post)?;

    Ok(ok_json(&post.comments)?)
}

// DELETE /posts/comment/:id/:comment_id
pub fn delete_comment(app: &App, call: &Call<'_>, identity: Identity) -> Result<ApiResponse, ApiError> {
    const NO_COMMENT: &str = "Comment does not exist";
    let db = app.db();
    let mut post = load(db, call)?;
    let comment_id = call.id_param("comment_id", NO_COMMENT)?;

    let index = post
        .comments
        .iter()
        .position(|c| c.id == comment_id)
        .ok_or(ApiError::NotFound(NO_COMMENT))?;
    ownership::ensure_owner(identity.user_id, post.comments[index].user)?;

    post.comments.remove(index);
    save(db, &post)?;

    Ok(ok_json(&post.comments)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_required_after_sanitizing() {
        let form = PostForm { text: Some("<script>x</script>".into()) };
        assert!(matches!(form.validate(), Err(ApiError::Validation(_))));

        let form = PostForm { text: None };
        assert!(matches!(form.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn text_length_is_capped() {
        let form = PostForm { text: Some("a".repeat(MAX_POST_LENGTH + 1)) };
        assert!(matches!(form.validate(), Err(ApiError::Validation(_))));

        let form = PostForm { text: Some("a".repeat(MAX_POST_LENGTH)) };
        assert_eq!(form.validate().unwrap().len(), MAX_POST_LENGTH);

        let form = CommentForm { text: Some("a".repeat(MAX_COMMENT_LENGTH + 1)) };
        assert!(matches!(form.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn ampersands_count_once_against_the_cap() {
        let form = PostForm { text: Some("&".repeat(MAX_POST_LENGTH)) };
        assert_eq!(form.validate().unwrap(), "&".repeat(MAX_POST_LENGTH));

        let form = PostForm { text: Some("&".repeat(MAX_POST_LENGTH + 1)) };
        assert!(matches!(form.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn markup_is_stripped_from_text() {
        let form = PostForm { text: Some("Hello <em>there</em>".into()) };
        assert_eq!(form.validate().unwrap(), "Hello there");
    }
}

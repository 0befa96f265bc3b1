//! Who may mutate what.
//!
//! Ownership is checked after the resource is loaded and before anything is
//! written. Likes are not an ownership question: they are membership guards
//! that keep each user in a post's `likes` at most once.

use crate::core::errors::ApiError;
use crate::models::models::{Id, Like, Post};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

pub fn authorize(actor: Id, owner: Id) -> Decision {
    if actor == owner {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}

pub fn ensure_owner(actor: Id, owner: Id) -> Result<(), ApiError> {
    match authorize(actor, owner) {
        Decision::Allowed => Ok(()),
        Decision::Denied => {
            tracing::warn!(%actor, %owner, "ownership check denied");
            Err(ApiError::Forbidden)
        }
    }
}

/// Adds `actor` to the front of the post's likes.
pub fn like(post: &mut Post, actor: Id) -> Result<(), ApiError> {
    if post.is_liked_by(actor) {
        return Err(ApiError::AlreadyLiked);
    }
    post.likes.insert(0, Like { user: actor });
    Ok(())
}

pub fn unlike(post: &mut Post, actor: Id) -> Result<(), ApiError> {
    let index = post
        .likes
        .iter()
        .position(|like| like.user == actor)
        .ok_or(ApiError::NotLiked)?;
    post.likes.remove(index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post_by(author: Id) -> Post {
        Post {
            id: Id::new(),
            user: author,
            text: "hello".to_string(),
            name: "Ada".to_string(),
            avatar: String::new(),
            likes: Vec::new(),
            comments: Vec::new(),
            date: Utc::now(),
        }
    }

    #[test]
    fn only_the_owner_is_allowed() {
        let a = Id::new();
        let b = Id::new();
        assert_eq!(authorize(a, a), Decision::Allowed);
        assert_eq!(authorize(a, b), Decision::Denied);
        assert!(matches!(ensure_owner(b, a), Err(ApiError::Forbidden)));
        assert!(ensure_owner(a, a).is_ok());
    }

    #[test]
    fn double_like_leaves_likes_unchanged() {
        let actor = Id::new();
        let mut post = post_by(Id::new());

        like(&mut post, actor).unwrap();
        let before = post.likes.clone();
        assert!(matches!(like(&mut post, actor), Err(ApiError::AlreadyLiked)));
        assert_eq!(post.likes, before);
    }

    #[test]
    fn newest_like_goes_first() {
        let (a, b) = (Id::new(), Id::new());
        let mut post = post_by(Id::new());
        like(&mut post, a).unwrap();
        like(&mut post, b).unwrap();
        assert_eq!(post.likes, vec![Like { user: b }, Like { user: a }]);
    }

    #[test]
    fn unlike_requires_existing_like() {
        let (a, b) = (Id::new(), Id::new());
        let mut post = post_by(Id::new());
        assert!(matches!(unlike(&mut post, a), Err(ApiError::NotLiked)));

        like(&mut post, a).unwrap();
        like(&mut post, b).unwrap();
        unlike(&mut post, a).unwrap();
        assert_eq!(post.likes, vec![Like { user: b }]);
        assert!(matches!(unlike(&mut post, a), Err(ApiError::NotLiked)));
    }
}

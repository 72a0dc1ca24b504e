//! Resource services layered on the request client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each service borrows the session's `ApiClient`, so every call goes through
//! the same credential attachment and single refresh-and-retry path. Posts and
//! comments are returned as raw JSON; their shape belongs to the backend.

pub mod comments;
pub mod images;
pub mod posts;
pub mod users;

pub use comments::CommentService;
pub use images::ImageService;
pub use posts::PostService;
pub use users::UserService;

#[cfg(test)]
#[path = "services_test.rs"]
mod tests;

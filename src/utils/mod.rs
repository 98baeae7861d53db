pub mod cookie;
pub mod jwt;
pub mod markdown;
pub mod password;
pub mod slug;
pub mod validation;

pub use jwt::{encode_access_token, encode_refresh_token};
pub use markdown::render_markdown;
pub use password::{hash_password, verify_password};
pub use slug::slugify;
pub use validation::not_blank;

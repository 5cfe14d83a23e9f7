pub mod auth;
pub mod tenant;
pub mod theme;

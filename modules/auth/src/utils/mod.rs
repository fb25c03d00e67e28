pub mod jwt;
pub mod rbac;

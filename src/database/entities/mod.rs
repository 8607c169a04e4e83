pub mod annotations;
pub mod projects;

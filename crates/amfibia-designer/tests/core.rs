#[path = "core/generators.rs"]
mod generators;
#[path = "core/patterns.rs"]
mod patterns;
#[path = "core/project.rs"]
mod project;
#[path = "core/transform.rs"]
mod transform;

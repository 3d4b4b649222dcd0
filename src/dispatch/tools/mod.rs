//! Per-operation dispatch adapters.

pub mod activity;
pub mod datetime_helper;
pub mod fetch_activity_content;
pub mod get_activity_details;
pub mod get_course_activities;
pub mod get_course_contents;
pub mod get_courses;
pub mod get_page_module_content;
pub mod get_resource_file_content;
pub mod util;

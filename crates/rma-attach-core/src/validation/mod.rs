//! Validation modules

pub mod file_name;

pub use file_name::{
    file_extension, numbered_name, parse_record_id, validate_category_key, validate_file_name,
};

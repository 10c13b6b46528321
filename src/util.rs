use std::iter::repeat;
use std::path::{Path, PathBuf};

use chrono::Utc;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// File name an upload is stored under: field name, creation timestamp in
/// milliseconds, original extension.
pub fn stored_file_name(field: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}-{}.{}", field, Utc::now().timestamp_millis(), ext),
        None => format!("{}-{}", field, Utc::now().timestamp_millis()),
    }
}

#[cfg(test)]
mod stored_names {
    use super::stored_file_name;

    #[test]
    fn name_is_field_timestamp_extension() {
        let name = stored_file_name("student_avatar", Some("png"));
        let rest = name.strip_prefix("student_avatar-").unwrap();
        let stamp = rest.strip_suffix(".png").unwrap();
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[test]
    fn missing_extension_is_left_off() {
        let name = stored_file_name("teacher_doc_front", None);
        assert!(name.starts_with("teacher_doc_front-"));
        assert!(!name.contains('.'));
    }
}

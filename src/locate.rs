use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::TestsConfig;

#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub test_root: PathBuf,
    pub main_root: PathBuf,
    pub extension: String,
    pub subject_suffixes: Vec<String>,
}

impl SourceLayout {
    pub fn from_config(workspace: &Path, tests: &TestsConfig) -> Self {
        Self {
            test_root: workspace.join(&tests.test_sources),
            main_root: workspace.join(&tests.main_sources),
            extension: tests.source_extension.clone(),
            subject_suffixes: tests.subject_suffixes.clone(),
        }
    }

    /// Source file of the test unit `unit` (fully qualified or simple name).
    pub fn locate_test(&self, unit: &str) -> Option<PathBuf> {
        find_source_file(&self.test_root, unit, &self.extension)
    }

    /// Source file of the unit a test unit exercises, if it can be found.
    pub fn locate_subject(&self, unit: &str) -> Option<PathBuf> {
        let subject = subject_name(unit, &self.subject_suffixes);
        find_source_file(&self.main_root, &subject, &self.extension)
    }
}

/// Strips the first matching suffix from the simple name of `unit`,
/// keeping the package qualifier. `com.acme.OrderServiceTest` becomes
/// `com.acme.OrderService`; a name with no recognized suffix is returned
/// unchanged.
pub fn subject_name(unit: &str, suffixes: &[String]) -> String {
    let (package, simple) = match unit.rsplit_once('.') {
        Some((package, simple)) => (Some(package), simple),
        None => (None, unit),
    };

    let stripped = suffixes
        .iter()
        .filter(|suffix| !suffix.is_empty())
        .find_map(|suffix| simple.strip_suffix(suffix.as_str()))
        .filter(|s| !s.is_empty())
        .unwrap_or(simple);

    match package {
        Some(package) => format!("{package}.{stripped}"),
        None => stripped.to_string(),
    }
}

/// Looks for `<simple name>.<extension>` under `root`.
///
/// The package-derived path (`com/acme/Foo.java`) wins when it exists;
/// otherwise the first file with a matching name in a sorted walk is used.
pub fn find_source_file(root: &Path, unit: &str, extension: &str) -> Option<PathBuf> {
    let simple = unit.rsplit('.').next().unwrap_or(unit);
    let file_name = format!("{simple}.{extension}");

    let mut package_path = root.to_path_buf();
    for segment in unit.split('.') {
        package_path.push(segment);
    }
    package_path.set_extension(extension);
    if package_path.is_file() {
        return Some(package_path);
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| entry.file_name().to_str() == Some(file_name.as_str()))
        .map(walkdir::DirEntry::into_path)
}

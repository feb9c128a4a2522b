use std::path::{Component, Path, PathBuf};

/// `target` expressed relative to `base`. Both must be absolute.
///
/// Walks up from `base` with `..` as needed, e.g. `/a/b` → `/a/c/d` is
/// `../c/d`.
#[must_use]
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();

    let common = base.iter().zip(&target).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}

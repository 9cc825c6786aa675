//! Literal placeholder substitution for manifest templates.

use std::path::Path;

use crate::error::Result;
use crate::io;

/// Replace every occurrence of each placeholder with its value.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in substitutions {
        out = out.replace(placeholder, value);
    }
    out
}

/// Apply substitutions to a file in place.
pub fn render_file(path: &Path, substitutions: &[(&str, &str)]) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    io::atomic_write(path, render(&content, substitutions).as_bytes())
}

/// Drop every line containing `needle` from the file.
pub fn strip_lines_containing(path: &Path, needle: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| !line.contains(needle))
        .collect();
    let mut out = kept.join("\n");
    if content.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    io::atomic_write(path, out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn render_replaces_all_placeholders() {
        let template = "channel: CHANNEL\nname: PACKAGE\nsource: SOURCE\n";
        let rendered = render(
            template,
            &[
                ("CHANNEL", "alpha"),
                ("PACKAGE", "jupyterlab"),
                ("SOURCE", "aihub-catalog"),
            ],
        );
        assert_eq!(
            rendered,
            "channel: alpha\nname: jupyterlab\nsource: aihub-catalog\n"
        );
    }

    #[test]
    fn render_replaces_repeated_occurrences() {
        assert_eq!(render("OPERATOR/OPERATOR", &[("OPERATOR", "x")]), "x/x");
    }

    #[test]
    fn render_file_rewrites_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kaniko.yaml");
        std::fs::write(&path, "image: IMAGETAG\n").unwrap();
        render_file(&path, &[("IMAGETAG", "docker.io/aihubops/x:v0.0.1")]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "image: docker.io/aihubops/x:v0.0.1\n"
        );
    }

    #[test]
    fn strip_lines_drops_only_matching_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minio.yaml");
        std::fs::write(&path, "a: 1\n  subPath: minio\nb: 2\n").unwrap();
        strip_lines_containing(&path, "subPath: minio").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: 1\nb: 2\n");
    }
}

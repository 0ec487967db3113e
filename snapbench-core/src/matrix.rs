// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Test-matrix parsing.
//!
//! Each row is `shortName,imageReference[,indexDigest[,readyLine]]`. An empty
//! optional column means the value is absent. A row with the wrong column
//! count aborts startup; rows are never skipped silently.

use std::path::Path;

use crate::error::ConfigError;
use crate::types::ImageDescriptor;

/// Load every image row from a matrix file.
pub fn load_matrix(path: impl AsRef<Path>) -> Result<Vec<ImageDescriptor>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_matrix(path, &content)
}

/// Parse matrix content; `path` is only used for error messages.
pub fn parse_matrix(path: &Path, content: &str) -> Result<Vec<ImageDescriptor>, ConfigError> {
    let mut images = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let malformed = || ConfigError::MalformedRow {
            path: path.to_path_buf(),
            line: index + 1,
            found: fields.len(),
        };

        let (short_name, image_ref, optional) = match fields.as_slice() {
            [short_name, image_ref, rest @ ..] if rest.len() <= 2 => (*short_name, *image_ref, rest),
            _ => return Err(malformed()),
        };

        let mut descriptor = ImageDescriptor::new(short_name, image_ref);
        if let Some(digest) = optional.first().filter(|d| !d.is_empty()) {
            descriptor = descriptor.with_index_digest(*digest);
        }
        if let Some(ready_line) = optional.get(1).filter(|l| !l.is_empty()) {
            descriptor = descriptor.with_ready_line(*ready_line);
        }

        if descriptor.short_name.is_empty() || descriptor.image_ref.is_empty() {
            return Err(ConfigError::InvalidFieldValue {
                field: "matrix row",
                value: trimmed.to_string(),
                reason: format!("Row {} has an empty name or image reference", index + 1),
            });
        }

        images.push(descriptor);
    }

    tracing::debug!(path = %path.display(), rows = images.len(), "Loaded test matrix");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(content: &str) -> Result<Vec<ImageDescriptor>, ConfigError> {
        parse_matrix(&PathBuf::from("matrix.csv"), content)
    }

    #[test]
    fn test_two_and_three_column_rows() {
        let images = parse(
            "Alpine,docker.io/library/alpine:latest\n\
             Tensorflow, public.ecr.aws/tf:2.9 , sha256:1234\n",
        )
        .unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].short_name, "Alpine");
        assert!(images[0].index_digest.is_none());
        assert_eq!(images[1].image_ref, "public.ecr.aws/tf:2.9");
        assert_eq!(images[1].index_digest.as_deref(), Some("sha256:1234"));
    }

    #[test]
    fn test_blank_lines_and_comments_ignored() {
        let images = parse("# name,ref\n\nAlpine,alpine:latest\n\n").unwrap();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_empty_digest_means_none() {
        let images = parse("Alpine,alpine:latest,\n").unwrap();
        assert!(images[0].index_digest.is_none());
    }

    #[test]
    fn test_ready_line_column() {
        let images = parse(
            "Nginx,public.ecr.aws/nginx/nginx:latest,,start worker processes\n\
             Redis,public.ecr.aws/redis:7,sha256:beef,Ready to accept connections\n",
        )
        .unwrap();

        assert!(images[0].index_digest.is_none());
        assert_eq!(images[0].ready_line.as_deref(), Some("start worker processes"));
        assert_eq!(images[1].index_digest.as_deref(), Some("sha256:beef"));
        assert_eq!(
            images[1].ready_line.as_deref(),
            Some("Ready to accept connections")
        );
    }

    #[test]
    fn test_wrong_column_count_is_fatal() {
        let result = parse("Alpine,alpine:latest\nbroken\n");
        match result {
            Err(ConfigError::MalformedRow { line, found, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }

        assert!(parse("a,b,c,d,e\n").is_err());
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert!(matches!(
            parse("Alpine,\n"),
            Err(ConfigError::InvalidFieldValue { .. })
        ));
    }
}

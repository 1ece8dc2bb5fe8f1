//! Result files

use crate::error::Result;
use crate::network::GraphQLResponse;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use url::Url;

/// Persists a GraphQL response under a file name
pub trait ResultWriter: Send + Sync {
    fn write(&self, response: &GraphQLResponse, path: &Path) -> Result<()>;
}

/// Writes pretty-printed JSON, replacing any existing file
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileWriter;

impl ResultWriter for JsonFileWriter {
    fn write(&self, response: &GraphQLResponse, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(response)?;
        std::fs::write(path, json)?;
        info!("Introspection data saved to {}", path.display());
        Ok(())
    }
}

/// Per-endpoint file name: `<output without .json>_<path segments joined by "_", or "root">.json`.
///
/// Characters other than ASCII alphanumerics, `-` and `_` become `_`. An unparsable
/// target URL falls back to `output` unchanged.
pub fn output_file_for(output: &str, target_url: &str) -> String {
    let Ok(url) = Url::parse(target_url) else {
        return output.to_string();
    };
    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect()
        })
        .collect();
    let suffix = if segments.is_empty() {
        "root".to_string()
    } else {
        segments.join("_")
    };
    let base = output.strip_suffix(".json").unwrap_or(output);
    format!("{}_{}.json", base, suffix)
}

/// `file` itself, or `file` with `_2`, `_3`, ... before `.json` until it is not in `taken`
pub fn unique_file_name(file: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(file) {
        return file.to_string();
    }
    let base = file.strip_suffix(".json").unwrap_or(file);
    (2..)
        .map(|n| format!("{}_{}.json", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| file.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_file_for() {
        assert_eq!(
            output_file_for("introspection.json", "http://x/api/v1/graphql"),
            "introspection_api_v1_graphql.json"
        );
        assert_eq!(output_file_for("out.json", "http://x/"), "out_root.json");
        assert_eq!(output_file_for("out.json", "http://x"), "out_root.json");
        assert_eq!(output_file_for("results/out", "http://x/gql/"), "results/out_gql.json");
        assert_eq!(output_file_for("out.json", "http://x/graphql.php"), "out_graphql_php.json");
        assert_eq!(output_file_for("out.json", "not a url"), "out.json");
    }

    #[test]
    fn test_endpoints_sharing_last_segment_get_distinct_files() {
        let graphql = output_file_for("introspection.json", "http://x/graphql");
        let v1 = output_file_for("introspection.json", "http://x/v1/graphql");
        let api = output_file_for("introspection.json", "http://x/api/graphql");
        assert_eq!(graphql, "introspection_graphql.json");
        assert_eq!(v1, "introspection_v1_graphql.json");
        assert_eq!(api, "introspection_api_graphql.json");
    }

    #[test]
    fn test_unique_file_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_file_name("out_graphql.json", &taken), "out_graphql.json");
        taken.insert("out_graphql.json".to_string());
        assert_eq!(unique_file_name("out_graphql.json", &taken), "out_graphql_2.json");
        taken.insert("out_graphql_2.json".to_string());
        assert_eq!(unique_file_name("out_graphql.json", &taken), "out_graphql_3.json");
    }

    #[test]
    fn test_json_file_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out_graphql.json");
        let response = GraphQLResponse::from_value(json!({ "data": { "__schema": { "types": [] } } })).unwrap();

        JsonFileWriter.write(&response, &path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, response.into_value());
    }
}

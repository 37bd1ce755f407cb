//! Plain-text parser: statistics, heuristic document-type detection,
//! entity extraction and type-specific metadata.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use super::{keyword_list, DocumentParser, ParseOutcome};
use crate::error::ToolError;

/// Stop words specific to plain-text artifacts.
const TEXT_STOP_WORDS: &[&str] = &[
    "txt", "text", "file", "document", "doc", "log", "config", "conf", "cfg", "ini",
    "properties", "settings", "prefs", "data", "output", "input", "temp", "tmp", "backup", "bak",
];

/// Lines sampled for content-based type detection.
const MAX_LINE_SAMPLE: usize = 1000;

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect(concat!("regex ", stringify!($name))))
        }
    };
}

cached_regex!(email_re, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b");
cached_regex!(
    url_re,
    r"https?://(?:[-\w.])+(?::\d+)?(?:/(?:[\w/_.\-])*(?:\?(?:[\w&=%.\-])*)?(?:#\w*)?)?"
);
cached_regex!(phone_re, r"\+?1?[-.\s]?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}");
cached_regex!(date_re, r"\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\b|\b\d{1,2}[-/]\d{1,2}[-/]\d{4}\b");
cached_regex!(time_re, r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:[AP]M)?\b");
cached_regex!(log_level_re, r"(?i)\b(DEBUG|INFO|WARN|WARNING|ERROR|FATAL|TRACE)\b");
cached_regex!(log_timestamp_re, r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}");
cached_regex!(config_kv_re, r"(?m)^([^=:\s#;\[][^=:\s]*)\s*[=:]\s*(.+)$");
cached_regex!(ini_section_re, r"(?m)^\[([^\]]+)\]$");
cached_regex!(function_re, r"\b\w+\s*\([^)]*\)");
cached_regex!(var_assign_re, r"(?m)^\s*\w+\s*=\s*.+$");
cached_regex!(blank_runs_re, r"\n{3,}");
cached_regex!(spaces_re, r"[ \t]+");

pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }

    fn basic_stats(&self, content: &str) -> Map<String, Value> {
        let lines: Vec<&str> = content.split('\n').collect();
        let words: Vec<&str> = content.split_whitespace().collect();
        let paragraphs = content.split("\n\n").filter(|p| !p.trim().is_empty()).count();
        let empty_lines = lines.iter().filter(|l| l.trim().is_empty()).count();

        let avg_line_length = if lines.is_empty() {
            0.0
        } else {
            lines.iter().map(|l| l.chars().count()).sum::<usize>() as f64 / lines.len() as f64
        };
        let avg_word_length = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64
        };

        let mut stats = Map::new();
        stats.insert("character_count".into(), json!(content.chars().count()));
        stats.insert("word_count".into(), json!(words.len()));
        stats.insert("line_count".into(), json!(lines.len()));
        stats.insert("paragraph_count".into(), json!(paragraphs));
        stats.insert("empty_line_count".into(), json!(empty_lines));
        stats.insert("average_line_length".into(), json!(avg_line_length));
        stats.insert("average_word_length".into(), json!(avg_word_length));
        stats.insert("text_type".into(), Value::String("text".into()));
        stats
    }

    /// Heuristic document sub-type: extension and file-name hints first,
    /// then content pattern densities over a bounded line sample.
    fn detect_document_type(&self, content: &str, file_path: Option<&str>) -> Map<String, Value> {
        let mut info = Map::new();
        let mut document_type = "text".to_string();

        if let Some(path) = file_path {
            let path = Path::new(path);
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();

            document_type = match extension.as_str() {
                ".log" | ".out" | ".err" => "log",
                ".cfg" | ".conf" | ".config" | ".ini" | ".properties" | ".env" => "config",
                ".py" | ".js" | ".css" | ".html" | ".htm" | ".sh" | ".bat" | ".cmd" | ".ps1" => {
                    "code"
                }
                ".csv" | ".tsv" => "data",
                ".json" | ".xml" | ".yaml" | ".yml" => "structured_data",
                ".sql" => "sql",
                _ => "text",
            }
            .to_string();

            if ["readme", "changelog", "license", "authors", "contributors"].contains(&stem.as_str())
            {
                document_type = stem.clone();
            } else if stem.contains("todo") || stem.contains("fixme") {
                document_type = "todo".to_string();
            } else if stem.contains("notes") {
                document_type = "notes".to_string();
            }
        }

        let sample: String = content
            .split('\n')
            .take(MAX_LINE_SAMPLE)
            .collect::<Vec<_>>()
            .join("\n");

        let log_hits = log_level_re().find_iter(&sample).count();
        let timestamp_hits = log_timestamp_re().find_iter(&sample).count();
        if log_hits > 5 || timestamp_hits > 3 {
            document_type = "log".to_string();
            info.insert(
                "log_confidence".into(),
                json!(((log_hits + timestamp_hits) as f64 / 10.0).min(1.0)),
            );
        }

        let config_hits = config_kv_re().find_iter(&sample).count();
        let ini_sections = ini_section_re().find_iter(&sample).count();
        if config_hits > 5 || ini_sections > 0 {
            if document_type == "text" {
                document_type = "config".to_string();
            }
            info.insert(
                "config_confidence".into(),
                json!(((config_hits + ini_sections * 3) as f64 / 15.0).min(1.0)),
            );
        }

        let function_hits = function_re().find_iter(&sample).count();
        let assignment_hits = var_assign_re().find_iter(&sample).count();
        if function_hits > 2 || assignment_hits > 5 {
            if document_type == "text" {
                document_type = "code".to_string();
            }
            info.insert(
                "code_confidence".into(),
                json!(((function_hits * 2 + assignment_hits) as f64 / 12.0).min(1.0)),
            );
        }

        let trimmed = sample.trim_start();
        if document_type == "text"
            && (trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('<'))
        {
            document_type = "structured_data".to_string();
            info.insert("structured_confidence".into(), json!(0.8));
        }

        info.insert("document_type".into(), Value::String(document_type));
        info
    }

    /// Emails, URLs, phone numbers, dates and times, deduplicated, with
    /// counts alongside.
    fn extract_entities(&self, content: &str) -> Map<String, Value> {
        let mut entities = Map::new();
        let collect = |re: &Regex| -> Vec<String> {
            let mut found: Vec<String> =
                re.find_iter(content).map(|m| m.as_str().trim().to_string()).collect();
            found.sort_unstable();
            found.dedup();
            found
        };

        let emails = collect(email_re());
        if !emails.is_empty() {
            entities.insert("email_count".into(), json!(emails.len()));
            entities.insert("emails".into(), json!(emails));
        }
        let urls = collect(url_re());
        if !urls.is_empty() {
            entities.insert("url_count".into(), json!(urls.len()));
            entities.insert("urls".into(), json!(urls));
        }
        let phones: Vec<String> = collect(phone_re())
            .into_iter()
            .filter(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 10)
            .collect();
        if !phones.is_empty() {
            entities.insert("phone_count".into(), json!(phones.len()));
            entities.insert("phone_numbers".into(), json!(phones));
        }
        let dates = collect(date_re());
        if !dates.is_empty() {
            entities.insert("date_count".into(), json!(dates.len()));
            entities.insert("dates".into(), json!(dates));
        }
        let times = collect(time_re());
        if !times.is_empty() {
            entities.insert("time_count".into(), json!(times.len()));
            entities.insert("times".into(), json!(times));
        }
        entities
    }

    fn analyze_structure(&self, content: &str) -> Map<String, Value> {
        let mut structure = Map::new();
        let lines: Vec<&str> = content.split('\n').collect();
        if lines.is_empty() {
            return structure;
        }

        let indented = lines.iter().filter(|l| l.starts_with(' ') || l.starts_with('\t')).count();
        if indented > 0 {
            structure.insert("indented_line_count".into(), json!(indented));
            structure.insert(
                "indentation_percentage".into(),
                json!(indented as f64 / lines.len() as f64 * 100.0),
            );
        }

        // Header-ish lines: ALL CAPS, or underlined with dashes/equals.
        let mut potential_headers = 0usize;
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.len() >= 100 {
                continue;
            }
            let all_caps = trimmed.len() > 3
                && trimmed.chars().any(|c| c.is_alphabetic())
                && trimmed.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
            let underlined = lines
                .get(i + 1)
                .map(|next| {
                    let next = next.trim();
                    !next.is_empty() && next.chars().all(|c| c == '-' || c == '=')
                })
                .unwrap_or(false);
            if all_caps || underlined {
                potential_headers += 1;
            }
        }
        if potential_headers > 0 {
            structure.insert("header_count".into(), json!(potential_headers));
        }

        structure
    }

    fn log_metadata(&self, content: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        let mut level_counts: BTreeMap<String, usize> = BTreeMap::new();
        for m in log_level_re().find_iter(content) {
            *level_counts.entry(m.as_str().to_uppercase()).or_insert(0) += 1;
        }
        if !level_counts.is_empty() {
            let total: usize = level_counts.values().sum();
            let errors = level_counts.get("ERROR").copied().unwrap_or(0)
                + level_counts.get("FATAL").copied().unwrap_or(0);
            let warnings = level_counts.get("WARN").copied().unwrap_or(0)
                + level_counts.get("WARNING").copied().unwrap_or(0);
            metadata.insert("log_levels".into(), json!(level_counts));
            metadata.insert("total_log_entries".into(), json!(total));
            metadata.insert("error_percentage".into(), json!(errors as f64 / total as f64 * 100.0));
            metadata
                .insert("warning_percentage".into(), json!(warnings as f64 / total as f64 * 100.0));
        }

        let mut timestamps: Vec<&str> =
            log_timestamp_re().find_iter(content).map(|m| m.as_str()).collect();
        if !timestamps.is_empty() {
            timestamps.sort_unstable();
            metadata.insert("timestamp_count".into(), json!(timestamps.len()));
            metadata.insert("first_timestamp".into(), json!(timestamps[0]));
            metadata.insert("last_timestamp".into(), json!(timestamps[timestamps.len() - 1]));
        }
        metadata
    }

    fn config_metadata(&self, content: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        let keys: Vec<String> = config_kv_re()
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|g| g.as_str().trim().to_string())
            .collect();
        if !keys.is_empty() {
            metadata.insert("config_key_count".into(), json!(keys.len()));
            metadata.insert("config_keys".into(), json!(keys));
        }
        let sections: Vec<String> = ini_section_re()
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|g| g.as_str().to_string())
            .collect();
        if !sections.is_empty() {
            metadata.insert("ini_section_count".into(), json!(sections.len()));
            metadata.insert("ini_sections".into(), json!(sections));
        }

        let format = if content.contains("export ") || content.contains(".env") {
            "environment"
        } else if !sections.is_empty() {
            "ini"
        } else if !keys.is_empty() {
            "properties"
        } else {
            "unknown"
        };
        metadata.insert("config_format".into(), Value::String(format.into()));
        metadata
    }

    fn code_metadata(&self, content: &str) -> Map<String, Value> {
        let mut metadata = Map::new();
        let functions = function_re().find_iter(content).count();
        if functions > 0 {
            metadata.insert("function_count".into(), json!(functions));
        }
        let assignments = var_assign_re().find_iter(content).count();
        if assignments > 0 {
            metadata.insert("variable_assignment_count".into(), json!(assignments));
        }
        let comments = content
            .lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with("<!--")
            })
            .count();
        if comments > 0 {
            metadata.insert("comment_count".into(), json!(comments));
        }
        metadata
    }

    fn clean_for_indexing(&self, content: &str) -> String {
        let cleaned = blank_runs_re().replace_all(content, "\n\n");
        let cleaned = spaces_re().replace_all(&cleaned, " ");
        cleaned.trim().to_string()
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for TextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[
            ".txt", ".text", ".log", ".cfg", ".conf", ".config", ".ini", ".properties", ".env",
            ".dat", ".csv", ".tsv", ".json", ".xml", ".yaml", ".yml", ".sql", ".readme",
            ".changelog", ".authors", ".contributors", ".install", ".license", ".todo", ".fixme",
            ".notes",
        ]
    }

    fn parse(&self, content: &str, file_path: Option<&str>) -> Result<ParseOutcome, ToolError> {
        if content.is_empty() {
            return Err(ToolError::ParseFailed("Empty content provided".to_string()));
        }

        let mut outcome = ParseOutcome::default();
        outcome.metadata.extend(self.basic_stats(content));
        outcome.metadata.extend(self.detect_document_type(content, file_path));
        outcome.metadata.extend(self.extract_entities(content));
        outcome.metadata.extend(self.analyze_structure(content));

        let document_type = outcome
            .metadata
            .get("document_type")
            .and_then(|v| v.as_str())
            .unwrap_or("text")
            .to_string();
        match document_type.as_str() {
            "log" => outcome.metadata.extend(self.log_metadata(content)),
            "config" => outcome.metadata.extend(self.config_metadata(content)),
            "code" | "script" => outcome.metadata.extend(self.code_metadata(content)),
            _ => {}
        }

        outcome.content = self.clean_for_indexing(content);
        outcome.keywords = keyword_list(&outcome.content, TEXT_STOP_WORDS);
        if document_type != "text" {
            outcome.keywords.insert(0, document_type);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_parses_with_stats() {
        let parser = TextParser::new();
        let outcome = parser.parse("hello world\n\nsecond paragraph", Some("/tmp/a.txt")).unwrap();
        assert_eq!(outcome.metadata["word_count"], json!(4));
        assert_eq!(outcome.metadata["paragraph_count"], json!(2));
        assert_eq!(outcome.metadata["document_type"], Value::String("text".into()));
        assert!(outcome.keywords.contains(&"hello".to_string()));
    }

    #[test]
    fn log_content_is_detected_and_summarized() {
        let body = (0..8)
            .map(|i| format!("2025-03-0{} 10:0{}:00 ERROR worker failed", i % 9 + 1, i % 9))
            .collect::<Vec<_>>()
            .join("\n");
        let parser = TextParser::new();
        let outcome = parser.parse(&body, Some("/var/log/app.txt")).unwrap();
        assert_eq!(outcome.metadata["document_type"], Value::String("log".into()));
        assert_eq!(outcome.metadata["total_log_entries"], json!(8));
        assert_eq!(outcome.metadata["error_percentage"], json!(100.0));
        assert!(outcome.metadata.contains_key("first_timestamp"));
        // Detected type leads the keyword list.
        assert_eq!(outcome.keywords[0], "log");
    }

    #[test]
    fn ini_content_is_detected_as_config() {
        let body = "[server]\nhost = localhost\nport = 8080\n\n[client]\nretries = 3";
        let parser = TextParser::new();
        let outcome = parser.parse(body, Some("/etc/app.txt")).unwrap();
        assert_eq!(outcome.metadata["document_type"], Value::String("config".into()));
        assert_eq!(outcome.metadata["ini_section_count"], json!(2));
        assert_eq!(outcome.metadata["config_format"], Value::String("ini".into()));
    }

    #[test]
    fn entities_are_extracted_and_deduplicated() {
        let body = "Mail ada@example.com or ada@example.com, see https://example.com/page \
                    on 2025-01-15 at 14:30";
        let parser = TextParser::new();
        let outcome = parser.parse(body, None).unwrap();
        assert_eq!(outcome.metadata["email_count"], json!(1));
        assert_eq!(outcome.metadata["url_count"], json!(1));
        assert_eq!(outcome.metadata["date_count"], json!(1));
        assert_eq!(outcome.metadata["time_count"], json!(1));
    }

    #[test]
    fn extension_hint_wins_for_config_files() {
        let parser = TextParser::new();
        let outcome = parser.parse("just some text", Some("/etc/app.conf")).unwrap();
        assert_eq!(outcome.metadata["document_type"], Value::String("config".into()));
    }

    #[test]
    fn whitespace_is_normalized_for_indexing() {
        let parser = TextParser::new();
        let outcome = parser.parse("a\tb   c\n\n\n\n\nd", None).unwrap();
        assert_eq!(outcome.content, "a b c\n\nd");
    }

    #[test]
    fn empty_content_is_a_parse_failure() {
        let parser = TextParser::new();
        assert!(matches!(parser.parse("", None), Err(ToolError::ParseFailed(_))));
    }
}

use std::path::Path;

use tracing::debug;

use crate::error::LaunchError;

/// Id column in both the training corpus and the seed list
pub const ID_COLUMN: &str = "video_id";
/// Continuous slant score column in the training corpus
pub const SCORE_COLUMN: &str = "slant";

/// A video with its slant score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVideo {
    pub video_id: String,
    pub score: f64,
}

/// Load the training corpus from a CSV file with `video_id` and `slant` columns
pub fn load_corpus(path: &Path) -> Result<Vec<ScoredVideo>, LaunchError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LaunchError::Data(format!("cannot read {}: {}", path.display(), e)))?;
    parse_corpus(&content)
}

/// Load the seed pool from a CSV file with a `video_id` column
pub fn load_video_ids(path: &Path) -> Result<Vec<String>, LaunchError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LaunchError::Data(format!("cannot read {}: {}", path.display(), e)))?;
    parse_video_ids(&content)
}

/// Markers pandas reads as a missing value; such rows carry no score
const MISSING_SCORES: [&str; 4] = ["na", "n/a", "null", "none"];

pub fn parse_corpus(content: &str) -> Result<Vec<ScoredVideo>, LaunchError> {
    let mut rows = records(content).into_iter();
    let header = rows
        .next()
        .ok_or_else(|| LaunchError::Data("corpus is empty".into()))?;
    let id_idx = column(&header.fields, ID_COLUMN)?;
    let score_idx = column(&header.fields, SCORE_COLUMN)?;

    let mut videos = Vec::new();
    for row in rows {
        let video_id = row.field(id_idx);
        if video_id.is_empty() {
            continue;
        }
        let raw = row.field(score_idx);
        let score = match parse_score(raw) {
            Ok(Some(score)) => score,
            Ok(None) => {
                debug!(line = row.line, video_id, "row has no slant score, skipped");
                continue;
            }
            Err(()) => {
                return Err(LaunchError::Data(format!(
                    "line {}: invalid {} '{}' for {}",
                    row.line, SCORE_COLUMN, raw, video_id
                )))
            }
        };
        videos.push(ScoredVideo {
            video_id: video_id.to_string(),
            score,
        });
    }
    Ok(videos)
}

pub fn parse_video_ids(content: &str) -> Result<Vec<String>, LaunchError> {
    let mut rows = records(content).into_iter();
    let header = rows
        .next()
        .ok_or_else(|| LaunchError::Data("video list is empty".into()))?;
    let id_idx = column(&header.fields, ID_COLUMN)?;

    Ok(rows
        .map(|row| row.field(id_idx).to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// `Ok(None)` for an empty or NaN cell, `Err` for text that is not a number
fn parse_score(raw: &str) -> Result<Option<f64>, ()> {
    if raw.is_empty() || MISSING_SCORES.iter().any(|m| raw.eq_ignore_ascii_case(m)) {
        return Ok(None);
    }
    let score = raw.parse::<f64>().map_err(|_| ())?;
    Ok((!score.is_nan()).then_some(score))
}

fn column(header: &[String], name: &str) -> Result<usize, LaunchError> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| LaunchError::Data(format!("missing required column '{}'", name)))
}

/// One CSV record and the line it starts on
#[derive(Debug, PartialEq)]
struct Record {
    line: usize,
    fields: Vec<String>,
}

impl Record {
    fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(|s| s.trim()).unwrap_or_default()
    }
}

/// Split CSV content into records. Quoted fields may hold commas, `""` escapes
/// and line breaks. Blank lines are dropped.
fn records(content: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            '\n' if quoted => {
                field.push('\n');
                line += 1;
            }
            '\n' => {
                fields.push(std::mem::take(&mut field));
                push_record(&mut records, start, std::mem::take(&mut fields));
                line += 1;
                start = line;
            }
            '\r' if !quoted => {}
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_record(&mut records, start, fields);
    }
    records
}

fn push_record(records: &mut Vec<Record>, line: usize, fields: Vec<String>) {
    if fields.len() == 1 && fields[0].trim().is_empty() {
        return;
    }
    records.push(Record { line, fields });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_corpus_any_column_order() {
        let csv = "slant,title,video_id\n-0.8,\"left, leaning\",abc\n0.3,x,def\n";
        let videos = parse_corpus(csv).unwrap();
        assert_eq!(
            videos,
            vec![
                ScoredVideo { video_id: "abc".into(), score: -0.8 },
                ScoredVideo { video_id: "def".into(), score: 0.3 },
            ]
        );
    }

    #[test]
    fn test_missing_score_column_is_data_error() {
        let err = parse_corpus("video_id,title\nabc,x\n").unwrap_err();
        assert!(matches!(err, LaunchError::Data(msg) if msg.contains("slant")));
    }

    #[test]
    fn test_invalid_score_names_line() {
        let err = parse_corpus("video_id,slant\nabc,0.1\ndef,left\n").unwrap_err();
        assert!(matches!(err, LaunchError::Data(msg) if msg.contains("line 3")));
    }

    #[test]
    fn test_empty_ids_skipped() {
        let videos = parse_corpus("video_id,slant\n,0.1\nabc,0.2\n").unwrap();
        assert_eq!(videos.len(), 1);

        let ids = parse_video_ids("video_id\nx\n\n\"\"\ny\n").unwrap();
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_video_ids_require_id_column() {
        assert!(matches!(
            parse_video_ids("id\nx\n"),
            Err(LaunchError::Data(_))
        ));
    }

    #[test]
    fn test_escaped_quote_in_field() {
        let rows = records("a,\"say \"\"hi\"\"\",c\n");
        assert_eq!(
            rows[0].fields,
            vec!["a".to_string(), "say \"hi\"".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_empty_score_row_lands_nowhere() {
        let videos = parse_corpus("video_id,slant\nabc,0.1\ndef,\nghi,0.9\n").unwrap();
        let ids: Vec<&str> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["abc", "ghi"]);
    }

    #[test]
    fn test_nan_score_rows_skipped() {
        let videos =
            parse_corpus("video_id,slant\na,NaN\nb,nan\nc,NA\nd,\"\"\ne,-0.5\nf\n").unwrap();
        assert_eq!(
            videos,
            vec![ScoredVideo { video_id: "e".into(), score: -0.5 }]
        );
    }

    #[test]
    fn test_multiline_quoted_field_stays_in_record() {
        let csv = "video_id,title,slant\nabc,\"line one\nline two\",0.1\nghi,x,0.9\n";
        let videos = parse_corpus(csv).unwrap();
        assert_eq!(
            videos,
            vec![
                ScoredVideo { video_id: "abc".into(), score: 0.1 },
                ScoredVideo { video_id: "ghi".into(), score: 0.9 },
            ]
        );

        let rows = records(csv);
        assert_eq!(rows[1].fields[1], "line one\nline two");
    }

    #[test]
    fn test_error_line_counts_embedded_breaks() {
        let csv = "video_id,title,slant\r\nabc,\"a\r\nb\",0.1\r\ndef,x,left\r\n";
        let err = parse_corpus(csv).unwrap_err();
        assert!(matches!(err, LaunchError::Data(msg) if msg.contains("line 4")));
    }
}

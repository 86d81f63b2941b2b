//! Report artifacts for a finished run.
//!
//! [`summarize`] reduces the record table to per-cell statistics plus
//! rank-1 selection counts; the writers serialize records and summary
//! into the CSV and Markdown artifacts. Scores live in their cell's
//! native metric: a mean is taken within one (policy, metric) cell
//! only, and policies are compared across metrics by how often their
//! top hit came from a source, never by score magnitude.

use std::io::Write;

use chrono::Local;

use crate::chat::ChatRecord;
use crate::error::{RagBenchError, Result};
use crate::eval::{EvaluationRecord, EvaluationRun};
use crate::index::Metric;

/// Column order of the record CSV, matching [`EvaluationRecord`]'s
/// serialized fields.
const RECORD_HEADER: [&str; 7] = [
    "q_id",
    "policy",
    "metric",
    "source",
    "index_score",
    "score",
    "error",
];

/// Aggregate statistics for one (policy, metric) cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSummary {
    pub policy: String,
    pub metric: String,
    /// Rows recorded for the cell, error rows included.
    pub records: usize,
    /// Rows that carry an error.
    pub errors: usize,
    /// Mean effective score over the cell's clean rows; `None` when no
    /// clean row produced a score.
    pub mean_score: Option<f32>,
}

/// How often one policy's top hit came from one source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCount {
    pub policy: String,
    pub source: String,
    pub selections: usize,
}

/// Everything the Markdown report derives from the record table.
#[derive(Debug, Clone)]
pub struct Summary {
    /// One entry per (policy, metric) cell, in first-encounter order.
    pub cells: Vec<CellSummary>,
    /// Rank-1 selection counts, most-selected source first per policy.
    pub rank1: Vec<SourceCount>,
}

/// The score a row contributes to its cell: the remote score when the
/// scoring service produced one, the index score otherwise.
fn effective_score(record: &EvaluationRecord) -> Option<f32> {
    record.score.or(record.index_score)
}

/// Reduce the record table to per-cell means and rank-1 counts.
///
/// The mean is the arithmetic mean of a cell's effective scores. Rows
/// with an error are counted but contribute no score; scores from
/// different metrics are never averaged together.
pub fn summarize(records: &[EvaluationRecord]) -> Summary {
    let mut cells: Vec<CellSummary> = Vec::new();
    let mut sums: Vec<(f64, usize)> = Vec::new();

    for record in records {
        let position = match cells
            .iter()
            .position(|c| c.policy == record.policy && c.metric == record.metric)
        {
            Some(position) => position,
            None => {
                cells.push(CellSummary {
                    policy: record.policy.clone(),
                    metric: record.metric.clone(),
                    records: 0,
                    errors: 0,
                    mean_score: None,
                });
                sums.push((0.0, 0));
                cells.len() - 1
            }
        };

        cells[position].records += 1;
        if record.error.is_some() {
            cells[position].errors += 1;
        } else if let Some(score) = effective_score(record) {
            sums[position].0 += f64::from(score);
            sums[position].1 += 1;
        }
    }

    for (cell, (sum, count)) in cells.iter_mut().zip(&sums) {
        if *count > 0 {
            cell.mean_score = Some((sum / *count as f64) as f32);
        }
    }

    let rank1 = rank1_counts(records, &cells);

    Summary { cells, rank1 }
}

/// Count how often each (policy, source) pair took rank 1. A row with
/// a source counts even when scoring later failed on it; the hit
/// itself was still selected. Policies keep their cell order; within a
/// policy the most-selected source comes first.
fn rank1_counts(records: &[EvaluationRecord], cells: &[CellSummary]) -> Vec<SourceCount> {
    let mut counts: Vec<SourceCount> = Vec::new();

    for record in records {
        let Some(source) = record.source.as_deref() else {
            continue;
        };
        match counts
            .iter_mut()
            .find(|c| c.policy == record.policy && c.source == source)
        {
            Some(entry) => entry.selections += 1,
            None => counts.push(SourceCount {
                policy: record.policy.clone(),
                source: source.to_string(),
                selections: 1,
            }),
        }
    }

    let policy_rank = |policy: &str| {
        cells
            .iter()
            .position(|c| c.policy == policy)
            .unwrap_or(usize::MAX)
    };
    counts.sort_by(|a, b| {
        policy_rank(&a.policy)
            .cmp(&policy_rank(&b.policy))
            .then(b.selections.cmp(&a.selections))
            .then(a.source.cmp(&b.source))
    });

    counts
}

/// Write the record table as CSV: a header row, then one row per
/// record in run order.
pub fn write_records_csv<W: Write>(sink: W, records: &[EvaluationRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(sink);

    writer.write_record(RECORD_HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|err| RagBenchError::Csv(err.to_string()))
}

/// Write the transcript of a scripted chat session as CSV.
pub fn write_chat_csv<W: Write>(sink: W, records: &[ChatRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .flush()
        .map_err(|err| RagBenchError::Csv(err.to_string()))
}

/// Render the Markdown report for a completed run.
///
/// Rendered unconditionally once a run completes; a report full of
/// error rows is itself the result.
pub fn render_markdown(run: &EvaluationRun, summary: &Summary) -> String {
    let mut out = String::new();

    let errors: usize = summary.cells.iter().map(|c| c.errors).sum();
    out.push_str("# Retrieval Evaluation Report\n\n");
    out.push_str(&format!(
        "- Generated: {}\n",
        Local::now().format("%Y-%m-%d %H:%M")
    ));
    out.push_str(&format!("- Embedding dimension: {}\n", run.dimension));
    out.push_str(&format!("- Elapsed: {:.1}s\n", run.elapsed.as_secs_f64()));
    out.push_str(&format!(
        "- Records: {} ({errors} with errors)\n\n",
        run.records.len()
    ));

    out.push_str("## Mean score by cell\n\n");
    out.push_str("Scores are native to each metric; a mean is comparable only within its own row.\n\n");
    out.push_str("| Policy | Metric | Mean score | Records | Errors |\n");
    out.push_str("|---|---|---|---|---|\n");
    for cell in &summary.cells {
        let metric = if metric_ascending(&cell.metric) {
            format!("{} (lower is better)", cell.metric)
        } else {
            cell.metric.clone()
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            cell.policy,
            metric,
            opt_score(cell.mean_score),
            cell.records,
            cell.errors
        ));
    }
    out.push('\n');

    out.push_str("## Rank-1 source selections\n\n");
    out.push_str(
        "How often each policy's top hit came from a source document, across all metrics. \
         Policies are compared by these counts, never by score magnitude.\n\n",
    );
    if summary.rank1.is_empty() {
        out.push_str("No question retrieved a result.\n\n");
    } else {
        out.push_str("| Policy | Source | Selections |\n");
        out.push_str("|---|---|---|\n");
        for count in &summary.rank1 {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                count.policy,
                md_cell(&count.source),
                count.selections
            ));
        }
        out.push('\n');
    }

    out.push_str("## Skipped documents\n\n");
    if run.notes.is_empty() {
        out.push_str("None.\n\n");
    } else {
        out.push_str("| Policy | Document | Error |\n");
        out.push_str("|---|---|---|\n");
        for note in &run.notes {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                note.policy,
                md_cell(&note.document),
                md_cell(&note.error)
            ));
        }
        out.push('\n');
    }

    out.push_str("## Records\n\n");
    out.push_str("| q_id | Policy | Metric | Source | Index score | Score | Error |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for record in &run.records {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            md_cell(&record.question_id),
            record.policy,
            record.metric,
            md_cell(record.source.as_deref().unwrap_or("")),
            opt_score(record.index_score),
            opt_score(record.score),
            md_cell(record.error.as_deref().unwrap_or("")),
        ));
    }

    out
}

fn metric_ascending(label: &str) -> bool {
    Metric::all()
        .iter()
        .any(|m| m.label() == label && m.ascending())
}

fn opt_score(score: Option<f32>) -> String {
    match score {
        Some(score) => format!("{score:.4}"),
        None => String::new(),
    }
}

/// Keep literal pipes in a value from breaking the table.
fn md_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::chunking::ChunkPolicy;
    use crate::document::Question;
    use crate::eval::IngestNote;
    use crate::index::SearchHit;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            text: format!("問題{id}"),
        }
    }

    fn hit(source: &str, score: f32) -> SearchHit {
        SearchHit {
            text: "機器學習是一種方法。".to_string(),
            source: source.to_string(),
            score,
        }
    }

    const FIXED: ChunkPolicy = ChunkPolicy::FixedSize { size: 500 };
    const SLIDING: ChunkPolicy = ChunkPolicy::SlidingWindow {
        size: 400,
        overlap: 100,
    };

    #[test]
    fn test_mean_is_per_cell_and_skips_error_rows() {
        let records = vec![
            EvaluationRecord::success(&question("1"), FIXED, Metric::Cosine, &hit("a", 0.8), None),
            EvaluationRecord::success(&question("2"), FIXED, Metric::Cosine, &hit("a", 0.6), None),
            EvaluationRecord::failed(&question("3"), FIXED, Metric::Cosine, "boom"),
            EvaluationRecord::success(&question("1"), FIXED, Metric::Euclid, &hit("a", 2.0), None),
        ];

        let summary = summarize(&records);

        assert_eq!(summary.cells.len(), 2);
        let cosine = &summary.cells[0];
        assert_eq!(cosine.metric, "cosine");
        assert_eq!(cosine.records, 3);
        assert_eq!(cosine.errors, 1);
        assert!((cosine.mean_score.unwrap() - 0.7).abs() < 1e-6);

        let euclid = &summary.cells[1];
        assert_eq!(euclid.records, 1);
        assert!((euclid.mean_score.unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_remote_score_wins_over_index_score() {
        let records = vec![EvaluationRecord::success(
            &question("1"),
            FIXED,
            Metric::Cosine,
            &hit("a", 0.9),
            Some(0.5),
        )];

        let summary = summarize(&records);
        assert!((summary.cells[0].mean_score.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cell_of_only_errors_has_no_mean() {
        let records = vec![
            EvaluationRecord::failed(&question("1"), FIXED, Metric::Cosine, "boom"),
            EvaluationRecord::no_result(&question("2"), FIXED, Metric::Cosine),
        ];

        let summary = summarize(&records);
        assert_eq!(summary.cells.len(), 1);
        assert_eq!(summary.cells[0].records, 2);
        assert_eq!(summary.cells[0].errors, 1);
        assert!(summary.cells[0].mean_score.is_none());
    }

    #[test]
    fn test_rank1_counts_most_selected_source_first() {
        let records = vec![
            EvaluationRecord::success(&question("1"), FIXED, Metric::Cosine, &hit("b", 0.9), None),
            EvaluationRecord::success(&question("1"), FIXED, Metric::Euclid, &hit("a", 1.0), None),
            EvaluationRecord::success(&question("2"), FIXED, Metric::Euclid, &hit("a", 1.5), None),
            EvaluationRecord::success(&question("1"), SLIDING, Metric::Cosine, &hit("b", 0.7), None),
        ];

        let summary = summarize(&records);

        let fixed: Vec<_> = summary
            .rank1
            .iter()
            .filter(|c| c.policy == FIXED.label())
            .collect();
        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[0].source, "a");
        assert_eq!(fixed[0].selections, 2);
        assert_eq!(fixed[1].source, "b");
        assert_eq!(fixed[1].selections, 1);

        // Policy order follows the record table, not the counts.
        assert_eq!(summary.rank1[0].policy, FIXED.label());
        assert_eq!(summary.rank1.last().unwrap().policy, SLIDING.label());
    }

    #[test]
    fn test_records_csv_has_header_and_one_row_per_record() {
        let records = vec![
            EvaluationRecord::success(
                &question("1"),
                FIXED,
                Metric::Cosine,
                &hit("a", 0.9),
                Some(0.75),
            ),
            EvaluationRecord::no_result(&question("2"), FIXED, Metric::Cosine),
        ];

        let mut buffer = Vec::new();
        write_records_csv(&mut buffer, &records).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), records.len() + 1);
        assert_eq!(lines[0], "q_id,policy,metric,source,index_score,score,error");
        assert_eq!(lines[1], "1,fixed,cosine,a,0.9,0.75,");
        // A row without a hit keeps every optional column empty.
        assert_eq!(lines[2], "2,fixed,cosine,,,,");
    }

    #[test]
    fn test_records_csv_empty_input_still_writes_header() {
        let mut buffer = Vec::new();
        write_records_csv(&mut buffer, &[]).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text.trim_end(),
            "q_id,policy,metric,source,index_score,score,error"
        );
    }

    #[test]
    fn test_chat_csv_layout() {
        let records = vec![ChatRecord {
            conversation_id: "c1".to_string(),
            question: "它是什麼？".to_string(),
            rewritten: "機器學習是什麼".to_string(),
            answer: "一種方法。".to_string(),
            source: "doc_a".to_string(),
        }];

        let mut buffer = Vec::new();
        write_chat_csv(&mut buffer, &records).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "conversation_id,questions,rewritten,answer,source");
        assert_eq!(lines[1], "c1,它是什麼？,機器學習是什麼,一種方法。,doc_a");
    }

    #[test]
    fn test_markdown_report_sections() {
        let records = vec![
            EvaluationRecord::success(&question("1"), FIXED, Metric::Cosine, &hit("a", 0.9), None),
            EvaluationRecord::success(&question("1"), FIXED, Metric::Euclid, &hit("a", 1.2), None),
            EvaluationRecord::failed(&question("2"), FIXED, Metric::Euclid, "embed failed"),
        ];
        let summary = summarize(&records);
        let run = EvaluationRun {
            records,
            notes: vec![IngestNote {
                policy: FIXED.label().to_string(),
                document: "doc_b".to_string(),
                error: "connection refused".to_string(),
            }],
            dimension: 1024,
            elapsed: Duration::from_secs(42),
        };

        let report = render_markdown(&run, &summary);

        assert!(report.contains("# Retrieval Evaluation Report"));
        assert!(report.contains("- Embedding dimension: 1024"));
        assert!(report.contains("- Records: 3 (1 with errors)"));
        assert!(report.contains("| fixed | cosine | 0.9000 | 1 | 0 |"));
        assert!(report.contains("euclid (lower is better)"));
        assert!(report.contains("## Rank-1 source selections"));
        assert!(report.contains("| fixed | a | 2 |"));
        assert!(report.contains("| fixed | doc_b | connection refused |"));
        assert!(report.contains("| 2 | fixed | euclid |  |  |  | embed failed |"));
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        assert_eq!(md_cell("a|b"), "a\\|b");
    }
}

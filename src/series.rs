//! Parsing of captured sampler output into aligned numeric series.
//!
//! The sampler emits `#`-prefixed comment lines, one leading banner line, and
//! then whitespace-delimited data rows: 15 numeric/categorical columns followed
//! by the watched process's free-form command line.

/// One parsed data row.
#[derive(Debug, Clone, PartialEq)]
struct SampleTick {
    time: f64,
    usr: f64,
    sys: f64,
    rss: f64,
    io_read: f64,
    io_write: f64,
}

/// All series captured for one watched process.
///
/// The five data series and the time series always have identical length,
/// one entry per parsed tick. Time is re-based so the first tick sits at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries {
    /// Command line of the watched process, from the first data row.
    pub cmdline: String,
    pub time: Vec<f64>,
    pub usr: Vec<f64>,
    pub sys: Vec<f64>,
    pub rss: Vec<f64>,
    pub io_read: Vec<f64>,
    pub io_write: Vec<f64>,
}

impl SampleSeries {
    /// Number of ticks captured.
    pub fn len(&self) -> usize {
        self.time.len()
    }
}

/// Column positions within the 15-field prefix of a data row.
const FIELD_TIME: usize = 0;
const FIELD_USR: usize = 2;
const FIELD_SYS: usize = 3;
const FIELD_RSS: usize = 10;
const FIELD_IO_READ: usize = 12;
const FIELD_IO_WRITE: usize = 13;
const DATA_FIELDS: usize = 15;

/// Parse one numeric field, normalizing locale decimal commas first.
fn parse_field(field: &str) -> Option<f64> {
    field.replace(',', ".").parse().ok()
}

/// Parse one data row into a tick plus the trailing command-line tokens.
///
/// Rows with fewer than 15 fields or non-numeric values in the required
/// positions yield `None`; a row truncated by sampler termination looks
/// exactly like that and must not abort the parse.
fn parse_data_line(line: &str) -> Option<(SampleTick, String)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < DATA_FIELDS {
        return None;
    }
    let tick = SampleTick {
        time: parse_field(fields[FIELD_TIME])?,
        usr: parse_field(fields[FIELD_USR])?,
        sys: parse_field(fields[FIELD_SYS])?,
        rss: parse_field(fields[FIELD_RSS])?,
        io_read: parse_field(fields[FIELD_IO_READ])?,
        io_write: parse_field(fields[FIELD_IO_WRITE])?,
    };
    Some((tick, fields[DATA_FIELDS..].join(" ")))
}

/// Parse full sampler output into a series, or `None` when no usable rows
/// exist (e.g. the process exited before the first sample).
pub fn parse_sampler_output(raw: &str) -> Option<SampleSeries> {
    let mut lines = raw.lines().filter(|line| !line.starts_with('#'));
    // First non-comment line is the recurring banner/header, never data.
    let _banner = lines.next();

    let mut cmdline: Option<String> = None;
    let mut ticks: Vec<SampleTick> = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_data_line(line) {
            Some((tick, rest)) => {
                if cmdline.is_none() {
                    cmdline = Some(rest);
                }
                ticks.push(tick);
            }
            None => {
                tracing::debug!(line, "skipping unparseable sampler line");
            }
        }
    }

    if ticks.is_empty() {
        return None;
    }

    let origin = ticks[0].time;
    Some(SampleSeries {
        cmdline: cmdline.unwrap_or_default(),
        time: ticks.iter().map(|t| t.time - origin).collect(),
        usr: ticks.iter().map(|t| t.usr).collect(),
        sys: ticks.iter().map(|t| t.sys).collect(),
        rss: ticks.iter().map(|t| t.rss).collect(),
        io_read: ticks.iter().map(|t| t.io_read).collect(),
        io_write: ticks.iter().map(|t| t.io_write).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a data row with the given values in the tracked positions and
    /// harmless filler everywhere else.
    fn data_row(time: &str, usr: &str, sys: &str, rss: &str, rd: &str, wr: &str, cmd: &str) -> String {
        format!(
            "{time} 1234 {usr} {sys} 0.00 0.70 2 0.00 0.00 9000 {rss} 0.10 {rd} {wr} 0.00 {cmd}"
        )
    }

    fn sample_output(rows: &[String]) -> String {
        let mut out = String::from("Linux 5.15.0 (host) x86_64 (8 CPU)\n\n");
        for (i, row) in rows.iter().enumerate() {
            if i % 2 == 0 {
                out.push_str("# Time PID %usr %system %guest %CPU CPU minflt/s majflt/s VSZ RSS %MEM kB_rd/s kB_wr/s kB_ccwr/s Command\n");
            }
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_counts_data_rows_exactly() {
        let rows: Vec<String> = (0..5)
            .map(|i| data_row(&format!("{}", 100 + i), "1.0", "0.5", "250", "0.0", "0.0", "worker"))
            .collect();
        let series = parse_sampler_output(&sample_output(&rows)).unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series.usr.len(), 5);
        assert_eq!(series.sys.len(), 5);
        assert_eq!(series.rss.len(), 5);
        assert_eq!(series.io_read.len(), 5);
        assert_eq!(series.io_write.len(), 5);
    }

    #[test]
    fn test_time_rebased_to_zero_and_non_decreasing() {
        let rows = vec![
            data_row("1000", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            data_row("1001", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            data_row("1003", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
        ];
        let series = parse_sampler_output(&sample_output(&rows)).unwrap();
        assert_eq!(series.time, vec![0.0, 1.0, 3.0]);
        assert_eq!(series.time[0], 0.0);
        assert!(series.time.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_comma_decimals_equal_period_decimals() {
        let comma = vec![data_row("100,5", "12,5", "0,25", "250,75", "1,5", "2,5", "worker")];
        let period = vec![data_row("100.5", "12.5", "0.25", "250.75", "1.5", "2.5", "worker")];
        let from_comma = parse_sampler_output(&sample_output(&comma)).unwrap();
        let from_period = parse_sampler_output(&sample_output(&period)).unwrap();
        assert_eq!(from_comma, from_period);
        assert_eq!(from_comma.usr, vec![12.5]);
        assert_eq!(from_comma.sys, vec![0.25]);
        assert_eq!(from_comma.rss, vec![250.75]);
        assert_eq!(from_comma.io_read, vec![1.5]);
        assert_eq!(from_comma.io_write, vec![2.5]);
    }

    #[test]
    fn test_cmdline_from_first_row_trailing_tokens() {
        let rows = vec![
            data_row("100", "1.0", "0.5", "250", "0.0", "0.0", "python  ./myprog.py -v"),
            data_row("101", "1.0", "0.5", "250", "0.0", "0.0", "someother cmd"),
        ];
        let series = parse_sampler_output(&sample_output(&rows)).unwrap();
        // Whitespace runs collapse to single spaces when tokens are re-joined.
        assert_eq!(series.cmdline, "python ./myprog.py -v");
    }

    #[test]
    fn test_zero_rows_is_none() {
        let out = sample_output(&[]);
        assert!(parse_sampler_output(&out).is_none());
    }

    #[test]
    fn test_empty_input_is_none() {
        assert!(parse_sampler_output("").is_none());
    }

    #[test]
    fn test_comments_only_is_none() {
        assert!(parse_sampler_output("# one\n# two\n# three\n").is_none());
    }

    #[test]
    fn test_first_non_comment_line_always_discarded() {
        // No banner here: the first data-shaped line must still be dropped.
        let rows = vec![
            data_row("100", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            data_row("101", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            data_row("102", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
        ];
        let raw = rows.join("\n");
        let series = parse_sampler_output(&raw).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.time, vec![0.0, 1.0]);
    }

    #[test]
    fn test_short_line_skipped() {
        let rows = vec![
            data_row("100", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            // Truncated mid-write by termination.
            "101 1234 1.0".to_string(),
            data_row("102", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
        ];
        let series = parse_sampler_output(&sample_output(&rows)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.time, vec![0.0, 2.0]);
    }

    #[test]
    fn test_non_numeric_line_skipped() {
        let rows = vec![
            data_row("100", "1.0", "0.5", "250", "0.0", "0.0", "worker"),
            // A repeated plain-text header that slipped through uncommented.
            "Time PID %usr %system %guest %CPU CPU minflt/s majflt/s VSZ RSS %MEM kB_rd/s kB_wr/s kB_ccwr/s Command".to_string(),
        ];
        let series = parse_sampler_output(&sample_output(&rows)).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_whitespace_only_lines_skipped() {
        let raw = format!(
            "banner line\n   \n\t\n{}\n  \n",
            data_row("100", "1.0", "0.5", "250", "0.0", "0.0", "worker")
        );
        let series = parse_sampler_output(&raw).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_row_without_cmdline_tokens() {
        // Exactly 15 fields and no trailing command line.
        let raw = "banner\n100 1234 1.0 0.5 0.00 0.70 2 0.00 0.00 9000 250 0.10 0.0 0.0 0.00\n";
        let series = parse_sampler_output(raw).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.cmdline, "");
    }

    #[test]
    fn test_parse_field_handles_both_separators() {
        assert_eq!(parse_field("12,5"), Some(12.5));
        assert_eq!(parse_field("12.5"), Some(12.5));
        assert_eq!(parse_field("0"), Some(0.0));
        assert_eq!(parse_field("garbage"), None);
    }
}

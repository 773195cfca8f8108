//! The flat CSV projection of an experiment: one row per run.
//!
//! The header is `run_id,status,start_time`, then one `param:<key>` column per
//! param key and one `metric:<key>` column per metric key, each group sorted.
//! Every row has a cell for every column; an empty cell means "no value".

use std::{collections::BTreeSet, fs, io, path::Path};

use crate::{
    api::run::RunStatus,
    transfer::error::{Error, Result, SchemaError},
};

pub const RUN_ID: &str = "run_id";
pub const STATUS: &str = "status";
pub const START_TIME: &str = "start_time";
pub const PARAM_PREFIX: &str = "param:";
pub const METRIC_PREFIX: &str = "metric:";

/// The finalized column set of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub params: Vec<String>,
    pub metrics: Vec<String>,
}

/// One run as a row of cells aligned with a [`Header`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub run_id: String,
    pub status: String,
    pub start_time: String,
    pub params: Vec<String>,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Header,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    RunId,
    Status,
    StartTime,
    Param(usize),
    Metric(usize),
}

impl Header {
    /// Builds a header from key sets; keys end up sorted and unique.
    pub fn new(params: impl IntoIterator<Item = String>, metrics: impl IntoIterator<Item = String>) -> Self {
        Header {
            params: params.into_iter().collect::<BTreeSet<_>>().into_iter().collect(),
            metrics: metrics.into_iter().collect::<BTreeSet<_>>().into_iter().collect(),
        }
    }

    pub fn width(&self) -> usize {
        3 + self.params.len() + self.metrics.len()
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.width());
        columns.extend([RUN_ID, STATUS, START_TIME].iter().map(|column| column.to_string()));
        columns.extend(self.params.iter().map(|key| format!("{}{}", PARAM_PREFIX, key)));
        columns.extend(self.metrics.iter().map(|key| format!("{}{}", METRIC_PREFIX, key)));
        columns
    }

    /// Reads a header row. Columns without a prefix are params, unless
    /// `metric_keys` names them.
    fn parse<'a>(columns: impl IntoIterator<Item = &'a str>, metric_keys: &BTreeSet<String>) -> Result<(Header, Vec<Slot>), SchemaError> {
        let mut header = Header::default();
        let mut slots = Vec::new();
        let mut seen = BTreeSet::new();
        let mut keys = BTreeSet::new();
        for column in columns {
            if !seen.insert(column.to_string()) {
                return Err(SchemaError::DuplicateColumn(column.to_string()));
            }
            let slot = match column {
                RUN_ID => Slot::RunId,
                STATUS => Slot::Status,
                START_TIME => Slot::StartTime,
                _ => {
                    let (key, is_metric) = if let Some(key) = column.strip_prefix(METRIC_PREFIX) {
                        (key, true)
                    } else if let Some(key) = column.strip_prefix(PARAM_PREFIX) {
                        (key, false)
                    } else {
                        (column, metric_keys.contains(column))
                    };
                    // `lr`, `param:lr` and `metric:lr` all name the same key.
                    if !keys.insert(key.to_string()) {
                        return Err(SchemaError::DuplicateColumn(column.to_string()));
                    }
                    if is_metric {
                        header.metrics.push(key.to_string());
                        Slot::Metric(header.metrics.len() - 1)
                    } else {
                        header.params.push(key.to_string());
                        Slot::Param(header.params.len() - 1)
                    }
                }
            };
            slots.push(slot);
        }
        if !seen.contains(RUN_ID) {
            return Err(SchemaError::MissingColumn(RUN_ID));
        }
        Ok((header, slots))
    }
}

impl Row {
    /// An empty row for `header`; every cell is absent.
    pub fn blank(run_id: impl Into<String>, header: &Header) -> Self {
        Row {
            run_id: run_id.into(),
            status: String::new(),
            start_time: String::new(),
            params: vec![String::new(); header.params.len()],
            metrics: vec![String::new(); header.metrics.len()],
        }
    }

    pub fn record(&self) -> Vec<&str> {
        let mut record = Vec::with_capacity(3 + self.params.len() + self.metrics.len());
        record.push(self.run_id.as_str());
        record.push(self.status.as_str());
        record.push(self.start_time.as_str());
        record.extend(self.params.iter().map(String::as_str));
        record.extend(self.metrics.iter().map(String::as_str));
        record
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.status.parse().ok()
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time.parse().ok()
    }

    /// Non-empty params as `(key, value)`.
    pub fn params<'a>(&'a self, header: &'a Header) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        header
            .params
            .iter()
            .zip(&self.params)
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Non-empty metric cells as `(key, value)`.
    pub fn metrics<'a>(&'a self, header: &'a Header) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        header
            .metrics
            .iter()
            .zip(&self.metrics)
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(key, value)| Some((key.as_str(), value.parse::<f64>().ok()?)))
    }

    fn validate(&self, header: &Header, line: u64) -> Result<(), SchemaError> {
        if self.run_id.is_empty() {
            return Err(SchemaError::EmptyRunId { line });
        }
        if !is_path_segment(&self.run_id) {
            return Err(SchemaError::UnsafeRunId { line, run_id: self.run_id.clone() });
        }
        if !self.status.is_empty() && self.status().is_none() {
            return Err(SchemaError::InvalidStatus { line, value: self.status.clone() });
        }
        if !self.start_time.is_empty() && self.start_time().is_none() {
            return Err(SchemaError::NotNumeric {
                line,
                column: START_TIME.to_string(),
                value: self.start_time.clone(),
            });
        }
        for (key, value) in header.metrics.iter().zip(&self.metrics) {
            if !value.is_empty() && value.parse::<f64>().is_err() {
                return Err(SchemaError::NotNumeric {
                    line,
                    column: format!("{}{}", METRIC_PREFIX, key),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Run ids name a directory under the export's artifact root, so they must be
/// a single plain path component.
pub fn is_path_segment(id: &str) -> bool {
    id != "."
        && id != ".."
        && !id.is_empty()
        && !id.contains(|c: char| c == '/' || c == '\\' || c == ':')
        && !Path::new(id).is_absolute()
}

/// Writes `table` as CSV. Rows must be aligned with the header.
pub fn write_table<W: io::Write>(writer: W, table: &Table) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().from_writer(writer);
    writer.write_record(table.header.columns())?;
    for row in &table.rows {
        debug_assert_eq!(row.params.len(), table.header.params.len());
        debug_assert_eq!(row.metrics.len(), table.header.metrics.len());
        writer.write_record(row.record())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table_file(path: &Path, table: &Table) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
    write_table(io::BufWriter::new(file), table)
        .map_err(|e| Error::io(format!("writing {}", path.display()), e.into()))
}

/// Parses and validates a whole table. The first bad row fails the table.
pub fn read_table<R: io::Read>(reader: R, metric_keys: &BTreeSet<String>) -> Result<Table, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let (header, slots) = Header::parse(reader.headers()?.iter(), metric_keys)?;

    let mut rows = Vec::new();
    let mut run_ids = BTreeSet::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |position| position.line());
        if record.len() != slots.len() {
            return Err(SchemaError::HeaderMismatch {
                line,
                expected: slots.len(),
                found: record.len(),
            });
        }
        let mut row = Row::blank(String::new(), &header);
        for (slot, value) in slots.iter().zip(record.iter()) {
            let cell = match *slot {
                Slot::RunId => &mut row.run_id,
                Slot::Status => &mut row.status,
                Slot::StartTime => &mut row.start_time,
                Slot::Param(i) => &mut row.params[i],
                Slot::Metric(i) => &mut row.metrics[i],
            };
            *cell = value.to_string();
        }
        row.validate(&header, line)?;
        if !run_ids.insert(row.run_id.clone()) {
            return Err(SchemaError::DuplicateRun { line, run_id: row.run_id });
        }
        rows.push(row);
    }
    Ok(Table { header, rows })
}

pub fn read_table_file(path: &Path, metric_keys: &BTreeSet<String>) -> Result<Table> {
    let file = fs::File::open(path).map_err(|e| Error::io(format!("opening {}", path.display()), e))?;
    Ok(read_table(io::BufReader::new(file), metric_keys)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_hints() -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn parse(csv: &str) -> Result<Table, SchemaError> {
        read_table(csv.as_bytes(), &no_hints())
    }

    #[test]
    fn header_columns_are_grouped_and_sorted() {
        let header = Header::new(vec!["lr".to_string(), "batch".to_string(), "lr".to_string()], vec!["acc".to_string()]);
        assert_eq!(header.columns(), vec!["run_id", "status", "start_time", "param:batch", "param:lr", "metric:acc"]);
        assert_eq!(header.width(), 6);
    }

    #[test]
    fn reparsing_written_table_is_identical() {
        let header = Header::new(vec!["lr".to_string(), "note".to_string()], vec!["acc".to_string(), "loss".to_string()]);
        let mut first = Row::blank("r1", &header);
        first.status = "FINISHED".into();
        first.start_time = "1600000000000".into();
        first.params = vec!["0.1".into(), "has, comma and \"quotes\"".into()];
        first.metrics = vec!["0.30000000000000004".into(), "".into()];
        let mut second = Row::blank("r2", &header);
        second.metrics = vec!["".into(), "NaN".into()];
        let table = Table { header, rows: vec![first, second] };

        let mut buffer = Vec::new();
        write_table(&mut buffer, &table).unwrap();
        let parsed = read_table(buffer.as_slice(), &no_hints()).unwrap();
        assert_eq!(parsed, table);

        let mut again = Vec::new();
        write_table(&mut again, &parsed).unwrap();
        assert_eq!(again, buffer);
    }

    #[test]
    fn typed_accessors_skip_empty_cells() {
        let table = parse("run_id,status,start_time,param:lr,param:opt,metric:acc\nr1,FINISHED,5,0.1,,0.95\n").unwrap();
        let row = &table.rows[0];
        assert_eq!(row.status(), Some(RunStatus::Finished));
        assert_eq!(row.start_time(), Some(5));
        assert_eq!(row.params(&table.header).collect::<Vec<_>>(), vec![("lr", "0.1")]);
        assert_eq!(row.metrics(&table.header).collect::<Vec<_>>(), vec![("acc", 0.95)]);
    }

    #[test]
    fn missing_run_id_column_is_rejected() {
        let error = parse("status,start_time,param:lr\nFINISHED,1,0.1\n").unwrap_err();
        assert!(matches!(error, SchemaError::MissingColumn(RUN_ID)));
    }

    #[test]
    fn row_width_must_match_the_header() {
        let error = parse("run_id,status,start_time,param:lr\nr1,FINISHED,1\n").unwrap_err();
        assert!(matches!(error, SchemaError::HeaderMismatch { line: 2, expected: 4, found: 3 }));
    }

    #[test]
    fn non_numeric_metric_is_rejected() {
        let error = parse("run_id,status,start_time,metric:acc\nr1,FINISHED,1,high\n").unwrap_err();
        match error {
            SchemaError::NotNumeric { column, value, .. } => {
                assert_eq!(column, "metric:acc");
                assert_eq!(value, "high");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn bad_status_start_time_and_run_id_are_rejected() {
        assert!(matches!(parse("run_id,status,start_time\nr1,DONE,1\n"), Err(SchemaError::InvalidStatus { .. })));
        assert!(matches!(parse("run_id,status,start_time\nr1,FINISHED,yesterday\n"), Err(SchemaError::NotNumeric { .. })));
        assert!(matches!(parse("run_id,status,start_time\n,FINISHED,1\n"), Err(SchemaError::EmptyRunId { .. })));
        assert!(matches!(parse("run_id,status,start_time\nr1,,\nr1,,\n"), Err(SchemaError::DuplicateRun { .. })));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        assert!(matches!(parse("run_id,param:lr,param:lr\n"), Err(SchemaError::DuplicateColumn(_))));
        assert!(matches!(parse("run_id,param:lr,metric:lr\n"), Err(SchemaError::DuplicateColumn(_))));
    }

    #[test]
    fn bare_and_prefixed_columns_for_one_key_are_rejected() {
        match parse("run_id,status,start_time,lr,param:lr\nr1,FINISHED,1,0.1,0.2\n") {
            Err(SchemaError::DuplicateColumn(column)) => assert_eq!(column, "param:lr"),
            other => panic!("unexpected result {:?}", other),
        }
        let hints: BTreeSet<String> = vec!["acc".to_string()].into_iter().collect();
        let error = read_table("run_id,metric:acc,acc\n".as_bytes(), &hints).unwrap_err();
        assert!(matches!(error, SchemaError::DuplicateColumn(column) if column == "acc"));
    }

    #[test]
    fn run_ids_that_are_not_a_plain_directory_name_are_rejected() {
        for run_id in ["/home/user/.ssh", "..", ".", "../secrets", "a/b", "a\\b", "C:"] {
            let csv = format!("run_id,status,start_time\n\"{}\",FINISHED,1\n", run_id);
            match parse(&csv) {
                Err(SchemaError::UnsafeRunId { line: 2, run_id: rejected }) => assert_eq!(rejected, run_id),
                other => panic!("{} was not rejected: {:?}", run_id, other),
            }
        }
        assert!(parse("run_id,status,start_time\n0123abcd,FINISHED,1\n").is_ok());
    }

    #[test]
    fn unprefixed_columns_use_metric_hints() {
        let hints: BTreeSet<String> = vec!["acc".to_string()].into_iter().collect();
        let table = read_table("run_id,status,start_time,lr,acc\nr1,FINISHED,1,0.1,0.95\n".as_bytes(), &hints).unwrap();
        assert_eq!(table.header.params, vec!["lr"]);
        assert_eq!(table.header.metrics, vec!["acc"]);
        assert_eq!(table.rows[0].metrics, vec!["0.95"]);
    }
}

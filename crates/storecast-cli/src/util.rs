use std::{
    fs::File,
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use storecast_table::raw::RawTable;
use storecast_training::config::PipelineConfig;

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn save_json<T>(value: &T, output_path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = Output::from_output_path(output_path)?;
        output.write_json(value)
    }

    /// Opens `output_path`, or stdout when it is `None` or `-`.
    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) if path.as_os_str() != "-" => Output::open(path),
            _ => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }

    /// Writes `rows` as CSV with a header derived from the row type.
    pub fn write_csv<T>(&mut self, rows: &[T]) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let path = self.display_path();
        write_csv_to(&mut *self, rows).with_context(|| format!("Failed to write CSV to {path}"))
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Read the pipeline configuration, or the defaults when no file is given
pub fn read_config_file(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => read_json_file("pipeline config", path),
        None => Ok(PipelineConfig::default()),
    }
}

/// Read a CSV file with a header row into a raw text table
///
/// # Errors
///
/// Returns error if the file cannot be opened, is not valid CSV, or has
/// duplicate header names
pub fn read_csv_file<P>(file_kind: &str, path: P) -> anyhow::Result<RawTable>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;
    let table = read_csv_from(io::BufReader::new(file))
        .with_context(|| format!("Failed to read {} CSV file: {}", file_kind, path.display()))?;
    tracing::info!(
        kind = file_kind,
        path = %path.display(),
        rows = table.len(),
        columns = table.header().len(),
        "loaded table"
    );
    Ok(table)
}

/// Read the training and test files, joining store attributes onto both when
/// a store file is given
pub fn read_inputs(
    train_path: &Path,
    test_path: &Path,
    stores_path: Option<&Path>,
    entity_column: &str,
) -> anyhow::Result<(RawTable, RawTable)> {
    let train = read_csv_file("training", train_path)?;
    let test = read_csv_file("test", test_path)?;
    let Some(stores_path) = stores_path else {
        return Ok((train, test));
    };
    let stores = read_csv_file("store attributes", stores_path)?;
    let train = train
        .left_join(&stores, entity_column)
        .context("Failed to join store attributes onto training data")?;
    let test = test
        .left_join(&stores, entity_column)
        .context("Failed to join store attributes onto test data")?;
    Ok((train, test))
}

fn read_csv_from<R>(reader: R) -> anyhow::Result<RawTable>
where
    R: io::Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let header = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_owned).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read CSV record")?;
    Ok(RawTable::new(header, rows)?)
}

fn write_csv_to<W, T>(writer: W, rows: &[T]) -> anyhow::Result<()>
where
    W: io::Write,
    T: serde::Serialize,
{
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use storecast_training::submission::SubmissionRow;

    use super::*;

    #[test]
    fn test_read_csv_trims_cells() {
        let data = "Store, Open ,StateHoliday\n1, 1,0\n2,0, a\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(table.header(), ["Store", "Open", "StateHoliday"]);
        assert_eq!(table.rows()[1], ["2", "0", "a"]);
    }

    #[test]
    fn test_read_csv_rejects_duplicate_header() {
        let data = "Store,Store\n1,2\n";
        assert!(read_csv_from(data.as_bytes()).is_err());
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        let data = "Store,Open\n1\n";
        assert!(read_csv_from(data.as_bytes()).is_err());
    }

    #[test]
    fn test_write_submission_csv() {
        let rows = [
            SubmissionRow { id: 1, sales: 64.0 },
            SubmissionRow { id: 2, sales: 1.0 },
        ];
        let mut buf = vec![];
        write_csv_to(&mut buf, &rows).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Id,Sales\n1,64.0\n2,1.0\n");
    }
}

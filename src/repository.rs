use crate::models::{ListingKey, ListingRecord};
use crate::reconcile::ListingLookup;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persistence seam used by the run orchestrator.
pub trait ListingRepository: ListingLookup {
    fn append_all(&mut self, batch: Vec<ListingRecord>) -> Result<()>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only CSV dataset of every listing observation ever recorded.
#[derive(Debug)]
pub struct CsvRepository {
    path: PathBuf,
    records: Vec<ListingRecord>,
}

impl CsvRepository {
    /// Opens the dataset at `path`, loading all existing rows. A missing file
    /// yields an empty repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = load_records(&path)?;
        Ok(Self { path, records })
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    /// Re-reads the dataset from disk.
    pub fn load(&self) -> Result<Vec<ListingRecord>> {
        load_records(&self.path)
    }

    /// All observations of a listing in the order they were appended.
    pub fn history_for(&self, key: &ListingKey) -> Vec<&ListingRecord> {
        self.records.iter().filter(|r| r.has_key(key)).collect()
    }

    fn write_batch(&self, batch: &[ListingRecord]) -> Result<()> {
        let with_header = self.records.is_empty();

        // An empty dataset is rewritten from scratch so a header-only file
        // never ends up with a second header.
        let mut content = if with_header {
            Vec::new()
        } else {
            let mut existing = fs::read(&self.path)
                .context(format!("Failed to read dataset: {}", self.path.display()))?;
            if !existing.is_empty() && !existing.ends_with(b"\n") {
                existing.push(b'\n');
            }
            existing
        };

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(with_header)
                .from_writer(&mut content);
            for record in batch {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut file = File::create(&tmp_path)
                .context(format!("Failed to create temporary file: {}", tmp_path.display()))?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
            .context(format!("Failed to replace dataset: {}", self.path.display()))?;

        Ok(())
    }
}

impl ListingLookup for CsvRepository {
    fn latest_for(&self, key: &ListingKey) -> Option<&ListingRecord> {
        self.records.iter().rev().find(|r| r.has_key(key))
    }
}

impl ListingRepository for CsvRepository {
    /// Appends the batch with a single atomic replace of the dataset file.
    fn append_all(&mut self, batch: Vec<ListingRecord>) -> Result<()> {
        if batch.is_empty() {
            debug!("Nothing to append to {}", self.path.display());
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        self.write_batch(&batch)?;
        info!("Appended {} records to {}", batch.len(), self.path.display());
        self.records.extend(batch);
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

fn load_records(path: &Path) -> Result<Vec<ListingRecord>> {
    if !path.exists() {
        info!("Dataset does not exist yet: {}", path.display());
        return Ok(Vec::new());
    }

    let file = File::open(path).context(format!("Failed to open dataset: {}", path.display()))?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<ListingRecord>().enumerate() {
        let record = result.context(format!(
            "Failed to parse row {} of {}",
            index + 1,
            path.display()
        ))?;
        records.push(record);
    }

    info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NOTE_PRICE_UPDATED;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(address: &str, price: Option<&str>) -> ListingRecord {
        let key = ListingKey::new("amsterdam", address);
        let mut r = ListingRecord::new(
            &format!("https://www.funda.nl/koop/amsterdam/huis-1-{}", address),
            &key,
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        r.vraagprijs = price.map(str::to_string);
        r.energielabel = Some("A+".to_string());
        r
    }

    fn temp_repo() -> (TempDir, CsvRepository) {
        let dir = TempDir::new().unwrap();
        let repo = CsvRepository::open(dir.path().join("listings.csv")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_missing_dataset_is_empty() {
        let (_dir, repo) = temp_repo();
        assert!(repo.is_empty());
        assert!(repo.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load_preserves_fields() {
        let (dir, mut repo) = temp_repo();
        let mut changed = record("dam_1", Some("475000"));
        changed.note = NOTE_PRICE_UPDATED.to_string();
        let batch = vec![record("dam_1", Some("450000")), record("singel_2", None), changed];

        repo.append_all(batch.clone()).unwrap();

        let reopened = CsvRepository::open(dir.path().join("listings.csv")).unwrap();
        assert_eq!(reopened.records(), batch.as_slice());
    }

    #[test]
    fn test_header_written_exactly_once() {
        let (dir, mut repo) = temp_repo();
        repo.append_all(vec![record("dam_1", Some("1"))]).unwrap();
        repo.append_all(vec![record("dam_2", Some("2"))]).unwrap();
        repo.append_all(vec![record("dam_3", Some("3"))]).unwrap();

        let content = fs::read_to_string(dir.path().join("listings.csv")).unwrap();
        assert_eq!(content.matches("extracted_on").count(), 1);
        assert!(content.starts_with("url,extracted_on,city,address,vraagprijs"));
        assert_eq!(repo.load().unwrap().len(), 3);
    }

    #[test]
    fn test_append_grows_by_batch_size() {
        let (_dir, mut repo) = temp_repo();
        repo.append_all(vec![record("a_1", None), record("b_2", None)]).unwrap();
        let before = repo.load().unwrap().len();

        repo.append_all(vec![record("c_3", None), record("d_4", None), record("e_5", None)])
            .unwrap();

        assert_eq!(repo.load().unwrap().len(), before + 3);
        assert_eq!(repo.len(), before + 3);
    }

    #[test]
    fn test_empty_batch_does_not_create_file() {
        let (dir, mut repo) = temp_repo();
        repo.append_all(Vec::new()).unwrap();
        assert!(!dir.path().join("listings.csv").exists());
    }

    #[test]
    fn test_latest_for_returns_most_recent() {
        let (_dir, mut repo) = temp_repo();
        repo.append_all(vec![record("dam_1", Some("450000")), record("singel_2", Some("1"))])
            .unwrap();
        repo.append_all(vec![record("dam_1", Some("475000"))]).unwrap();

        let key = ListingKey::new("amsterdam", "dam_1");
        let latest = repo.latest_for(&key).unwrap();
        assert_eq!(latest.vraagprijs.as_deref(), Some("475000"));

        let history = repo.history_for(&key);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].vraagprijs.as_deref(), Some("450000"));

        assert!(repo.latest_for(&ListingKey::new("utrecht", "dam_1")).is_none());
    }

    #[test]
    fn test_header_only_file_counts_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("listings.csv");
        fs::write(
            &path,
            "url,extracted_on,city,address,vraagprijs,vraagprijs_per_m2,bouwjaar,wonen,perceel,kamers,slaapkamers,energielabel,note\n",
        )
        .unwrap();

        let mut repo = CsvRepository::open(&path).unwrap();
        assert!(repo.is_empty());
        repo.append_all(vec![record("dam_1", None)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("extracted_on").count(), 1);
        assert_eq!(repo.load().unwrap().len(), 1);
    }
}

//! Test runs and materialized results on disk.
//!
//! Runs share the markdown frontmatter layout of records, with the case
//! snapshots and execution state carried in the frontmatter. Results are
//! plain versioned YAML documents; they have no free-text content.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{
        test_run::{RunResult, RunStatus},
        Actor, Lifecycle, RecordId, TestResult, TestRun, TestRunCase,
    },
    storage::markdown::{read_document, write_document, LoadError},
};

/// A test run serialized in markdown format with YAML frontmatter.
#[derive(Debug, Clone)]
pub struct MarkdownRun {
    frontmatter: RunFrontMatter,
    id: RecordId,
    title: String,
    body: String,
}

impl MarkdownRun {
    fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_document(writer, &self.frontmatter, self.id, &self.title, &self.body)
    }

    pub(crate) fn read<R: BufRead>(reader: &mut R) -> Result<Self, LoadError> {
        let (frontmatter, id, title, body) = read_document(reader)?;
        Ok(Self {
            frontmatter,
            id,
            title,
            body,
        })
    }

    /// Writes the run to a specific file path, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_path(&self, file_path: &Path) -> io::Result<()> {
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(file_path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)
    }

    /// Reads a run from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_path(file_path: &Path) -> Result<Self, LoadError> {
        let file = File::open(file_path).map_err(|io_error| match io_error.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound,
            _ => LoadError::Io(io_error),
        })?;

        let mut reader = BufReader::new(file);
        Self::read(&mut reader)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RunFrontMatterVersion")]
#[serde(into = "RunFrontMatterVersion")]
struct RunFrontMatter {
    uuid: Uuid,
    lifecycle: Lifecycle,
    cases: Vec<TestRunCase>,
    frozen: Option<(RunStatus, RunResult)>,
    created_at: DateTime<Utc>,
    created_by: Actor,
    modified_at: DateTime<Utc>,
    modified_by: Actor,
    version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum RunFrontMatterVersion {
    #[serde(rename = "1")]
    V1 {
        uuid: Uuid,
        lifecycle: Lifecycle,
        cases: Vec<TestRunCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frozen: Option<(RunStatus, RunResult)>,
        created_at: DateTime<Utc>,
        created_by: Actor,
        modified_at: DateTime<Utc>,
        modified_by: Actor,
        version: u64,
    },
}

impl From<RunFrontMatterVersion> for RunFrontMatter {
    fn from(version: RunFrontMatterVersion) -> Self {
        match version {
            RunFrontMatterVersion::V1 {
                uuid,
                lifecycle,
                cases,
                frozen,
                created_at,
                created_by,
                modified_at,
                modified_by,
                version,
            } => Self {
                uuid,
                lifecycle,
                cases,
                frozen,
                created_at,
                created_by,
                modified_at,
                modified_by,
                version,
            },
        }
    }
}

impl From<RunFrontMatter> for RunFrontMatterVersion {
    fn from(front_matter: RunFrontMatter) -> Self {
        let RunFrontMatter {
            uuid,
            lifecycle,
            cases,
            frozen,
            created_at,
            created_by,
            modified_at,
            modified_by,
            version,
        } = front_matter;
        Self::V1 {
            uuid,
            lifecycle,
            cases,
            frozen,
            created_at,
            created_by,
            modified_at,
            modified_by,
            version,
        }
    }
}

impl From<&TestRun> for MarkdownRun {
    fn from(run: &TestRun) -> Self {
        Self {
            frontmatter: RunFrontMatter {
                uuid: run.uuid(),
                lifecycle: run.lifecycle().clone(),
                cases: run.cases().to_vec(),
                frozen: if run.is_frozen() {
                    Some((run.status(), run.overall_result()))
                } else {
                    None
                },
                created_at: run.created_at(),
                created_by: run.created_by().clone(),
                modified_at: run.modified_at(),
                modified_by: run.modified_by().clone(),
                version: run.version(),
            },
            id: run.id(),
            title: run.title().to_string(),
            body: run.description().to_string(),
        }
    }
}

impl From<MarkdownRun> for TestRun {
    fn from(md: MarkdownRun) -> Self {
        Self {
            uuid: md.frontmatter.uuid,
            id: md.id,
            title: md.title,
            description: md.body,
            lifecycle: md.frontmatter.lifecycle,
            cases: md.frontmatter.cases,
            frozen: md.frontmatter.frozen,
            created_at: md.frontmatter.created_at,
            created_by: md.frontmatter.created_by,
            modified_at: md.frontmatter.modified_at,
            modified_by: md.frontmatter.modified_by,
            version: md.frontmatter.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum ResultVersions {
    #[serde(rename = "1")]
    V1 {
        #[serde(flatten)]
        result: TestResult,
    },
}

/// Writes a test result as a versioned YAML document, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn save_result(result: &TestResult, file_path: &Path) -> io::Result<()> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let document = ResultVersions::V1 {
        result: result.clone(),
    };
    let yaml = serde_yaml::to_string(&document).expect("this must never fail");
    std::fs::write(file_path, yaml)
}

/// Reads a test result back from its YAML document.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_result(file_path: &Path) -> Result<TestResult, LoadError> {
    let content = std::fs::read_to_string(file_path).map_err(|io_error| match io_error.kind() {
        io::ErrorKind::NotFound => LoadError::NotFound,
        _ => LoadError::Io(io_error),
    })?;

    let ResultVersions::V1 { result } = serde_yaml::from_str(&content)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::Utc;

    use super::*;
    use crate::domain::{test_run::CaseResult, Record, TestStep};

    fn actor() -> Actor {
        Actor::new("t", "t@example.com", "Tester")
    }

    fn run() -> TestRun {
        let case = Record::new(
            "TC-1".parse().unwrap(),
            "Verify login".to_string(),
            String::new(),
            vec![TestStep {
                action: "Open".to_string(),
                expected: "Opens".to_string(),
            }],
            actor(),
            Utc::now(),
        );
        TestRun::new(
            "TR-1".parse().unwrap(),
            "Smoke run".to_string(),
            "Nightly smoke pass.".to_string(),
            vec![TestRunCase::snapshot(&case)],
            actor(),
            Utc::now(),
        )
    }

    #[test]
    fn roundtrip_preserves_the_run() {
        let original = run();
        let md = MarkdownRun::from(&original);

        let mut buffer = Vec::new();
        md.write(&mut buffer).unwrap();

        let restored = MarkdownRun::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(TestRun::from(restored), original);
    }

    #[test]
    fn result_roundtrips_through_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("TRES-001.yaml");

        let result = TestResult {
            uuid: Uuid::new_v4(),
            id: "TRES-1".parse().unwrap(),
            run_uuid: Uuid::new_v4(),
            run_id: "TR-1".parse().unwrap(),
            test_case_uuid: Uuid::new_v4(),
            test_case_id: "TC-1".parse().unwrap(),
            result: CaseResult::Pass,
            created_at: Utc::now(),
            deleted_at: None,
        };

        save_result(&result, &path).unwrap();
        assert_eq!(load_result(&path).unwrap(), result);
    }
}

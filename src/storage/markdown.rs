//! Records serialized as markdown with YAML frontmatter.
//!
//! The document layout is shared by records and runs: a `---` delimited
//! YAML frontmatter block, a heading of the form `# <ID> <Title>`, and a
//! free-text body.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Actor, Lifecycle, ParseIdError, Record, RecordId, TestStep};

/// Errors that can occur when loading a document from markdown.
#[derive(Debug, thiserror::Error)]
#[error("failed to read from markdown")]
pub enum LoadError {
    /// The file was not found.
    NotFound,
    /// An I/O error occurred.
    Io(#[from] io::Error),
    /// The YAML frontmatter could not be parsed.
    Yaml(#[from] serde_yaml::Error),
    /// The id in the heading could not be parsed.
    Id(#[from] ParseIdError),
}

/// Writes a frontmatter document: YAML block, `# <ID> <Title>` heading,
/// then the body.
pub(crate) fn write_document<F, W>(
    writer: &mut W,
    frontmatter: &F,
    id: RecordId,
    title: &str,
    body: &str,
) -> io::Result<()>
where
    F: Serialize,
    W: Write,
{
    let frontmatter = serde_yaml::to_string(frontmatter).expect("this must never fail");
    let heading = format!("# {id} {title}");

    let result = if body.is_empty() {
        format!("---\n{frontmatter}---\n{heading}\n")
    } else {
        format!("---\n{frontmatter}---\n{heading}\n\n{body}\n")
    };

    writer.write_all(result.as_bytes())
}

/// Reads a frontmatter document back into its parts.
pub(crate) fn read_document<F, R>(reader: &mut R) -> Result<(F, RecordId, String, String), LoadError>
where
    F: DeserializeOwned,
    R: BufRead,
{
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "Empty input"))?
        .map_err(LoadError::from)?;

    if first_line.trim() != "---" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Expected frontmatter starting with '---'",
        )
        .into());
    }

    // Collect lines until the closing '---'
    let frontmatter = lines
        .by_ref()
        .map_while(|line| match line {
            Ok(content) if content.trim() == "---" => None,
            Ok(content) => Some(Ok(content)),
            Err(e) => Some(Err(e)),
        })
        .collect::<Result<Vec<_>, _>>()?
        .join("\n");

    let content = lines.collect::<Result<Vec<_>, _>>()?.join("\n");

    let frontmatter: F = serde_yaml::from_str(&frontmatter)?;
    let (id, title, body) = parse_content(&content)?;

    Ok((frontmatter, id, title, body))
}

/// Parses markdown content into id, title, and body.
///
/// The id must be the first token in the first heading, followed by the
/// title. The body is everything after the heading.
fn parse_content(content: &str) -> Result<(RecordId, String, String), LoadError> {
    let (heading_line_idx, line) = content
        .lines()
        .enumerate()
        .find(|(_, line)| line.trim().starts_with('#'))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "No heading found in content - the id must be in the first heading",
            )
        })?;

    let after_hashes = line.trim().trim_start_matches('#').trim();

    let first_token = after_hashes
        .split_whitespace()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "No id found in heading"))?;

    let id = first_token.parse::<RecordId>()?;

    let title = after_hashes
        .strip_prefix(first_token)
        .unwrap_or("")
        .trim()
        .to_string();

    let body = content
        .lines()
        .skip(heading_line_idx + 1)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Ok((id, title, body))
}

/// A record serialized in markdown format with YAML frontmatter.
#[derive(Debug, Clone)]
pub struct MarkdownRecord {
    frontmatter: FrontMatter,
    id: RecordId,
    title: String,
    body: String,
}

impl MarkdownRecord {
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

    /// Writes the record to a specific file path, creating parent
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

    /// Reads a record from a specific file path.
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
#[serde(from = "FrontMatterVersion")]
#[serde(into = "FrontMatterVersion")]
struct FrontMatter {
    uuid: Uuid,
    lifecycle: Lifecycle,
    steps: Vec<TestStep>,
    created_at: DateTime<Utc>,
    created_by: Actor,
    modified_at: DateTime<Utc>,
    modified_by: Actor,
    version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum FrontMatterVersion {
    #[serde(rename = "1")]
    V1 {
        uuid: Uuid,
        lifecycle: Lifecycle,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        steps: Vec<TestStep>,
        created_at: DateTime<Utc>,
        created_by: Actor,
        modified_at: DateTime<Utc>,
        modified_by: Actor,
        version: u64,
    },
}

impl From<FrontMatterVersion> for FrontMatter {
    fn from(version: FrontMatterVersion) -> Self {
        match version {
            FrontMatterVersion::V1 {
                uuid,
                lifecycle,
                steps,
                created_at,
                created_by,
                modified_at,
                modified_by,
                version,
            } => Self {
                uuid,
                lifecycle,
                steps,
                created_at,
                created_by,
                modified_at,
                modified_by,
                version,
            },
        }
    }
}

impl From<FrontMatter> for FrontMatterVersion {
    fn from(front_matter: FrontMatter) -> Self {
        let FrontMatter {
            uuid,
            lifecycle,
            steps,
            created_at,
            created_by,
            modified_at,
            modified_by,
            version,
        } = front_matter;
        Self::V1 {
            uuid,
            lifecycle,
            steps,
            created_at,
            created_by,
            modified_at,
            modified_by,
            version,
        }
    }
}

impl From<&Record> for MarkdownRecord {
    fn from(record: &Record) -> Self {
        Self {
            frontmatter: FrontMatter {
                uuid: record.uuid(),
                lifecycle: record.lifecycle().clone(),
                steps: record.steps().to_vec(),
                created_at: record.created_at(),
                created_by: record.created_by().clone(),
                modified_at: record.modified_at(),
                modified_by: record.modified_by().clone(),
                version: record.version(),
            },
            id: record.id(),
            title: record.title().to_string(),
            body: record.description().to_string(),
        }
    }
}

impl From<MarkdownRecord> for Record {
    fn from(md: MarkdownRecord) -> Self {
        Self {
            uuid: md.frontmatter.uuid,
            id: md.id,
            title: md.title,
            description: md.body,
            steps: md.frontmatter.steps,
            lifecycle: md.frontmatter.lifecycle,
            created_at: md.frontmatter.created_at,
            created_by: md.frontmatter.created_by,
            modified_at: md.frontmatter.modified_at,
            modified_by: md.frontmatter.modified_by,
            version: md.frontmatter.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn actor() -> Actor {
        Actor::new("u", "u@example.com", "User")
    }

    fn record() -> Record {
        Record::new(
            "TC-1".parse().unwrap(),
            "Verify login".to_string(),
            "Steps to confirm the login flow works.".to_string(),
            vec![TestStep {
                action: "Open the page".to_string(),
                expected: "The page loads".to_string(),
            }],
            actor(),
            Utc::now(),
        )
    }

    #[test]
    fn roundtrip_preserves_the_record() {
        let original = record();
        let md = MarkdownRecord::from(&original);

        let mut buffer = Vec::new();
        md.write(&mut buffer).unwrap();

        let restored = MarkdownRecord::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(Record::from(restored), original);
    }

    #[test]
    fn written_document_has_frontmatter_and_heading() {
        let md = MarkdownRecord::from(&record());
        let mut buffer = Vec::new();
        md.write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("---\n"));
        assert!(text.contains("_version: '1'"));
        assert!(text.contains("# TC-1 Verify login"));
        assert!(text.ends_with("Steps to confirm the login flow works.\n"));
    }

    #[test]
    fn empty_body_is_omitted() {
        let record = Record::new(
            "UR-1".parse().unwrap(),
            "Login".to_string(),
            String::new(),
            Vec::new(),
            actor(),
            Utc::now(),
        );
        let mut buffer = Vec::new();
        MarkdownRecord::from(&record).write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.ends_with("# UR-1 Login\n"));
    }

    #[test]
    fn missing_frontmatter_is_invalid() {
        let err = MarkdownRecord::read(&mut Cursor::new(b"# UR-1 Login\n")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn invalid_heading_id_is_rejected() {
        let record = record();
        let mut buffer = Vec::new();
        MarkdownRecord::from(&record).write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer)
            .unwrap()
            .replace("# TC-1", "# XX-1");

        let err = MarkdownRecord::read(&mut Cursor::new(text.into_bytes())).unwrap_err();
        assert!(matches!(err, LoadError::Id(_)));
    }
}

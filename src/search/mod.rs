//! Tantivy-based directory search.
//!
//! Indexes students and sponsors by name, email and school with field boosting. The index is
//! derived data: it is rebuilt from the database at startup and after restores.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Sponsor, Student, StudentValues};

const BOOST_NAME: f32 = 10.0;
const BOOST_EMAIL: f32 = 6.0;
const BOOST_SCHOOL: f32 = 4.0;

/// What a directory entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Student,
    Sponsor,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Student => "student",
            EntryKind::Sponsor => "sponsor",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "student" => Some(EntryKind::Student),
            "sponsor" => Some(EntryKind::Sponsor),
            _ => None,
        }
    }
}

/// Searchable projection of a student or sponsor.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub kind: EntryKind,
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub school: Option<String>,
}

impl DirectoryEntry {
    pub fn student(student: &Student, record: Option<&StudentValues>) -> Self {
        Self {
            kind: EntryKind::Student,
            id: student.id.clone(),
            name: student.display_name(),
            email: None,
            school: record.and_then(|r| r.school_name.clone()),
        }
    }

    pub fn sponsor(sponsor: &Sponsor) -> Self {
        let emails: Vec<&str> = [&sponsor.email, &sponsor.secondary_email]
            .into_iter()
            .filter_map(|e| e.as_deref())
            .collect();
        Self {
            kind: EntryKind::Sponsor,
            id: sponsor.id.clone(),
            name: sponsor.display_name(),
            email: (!emails.is_empty()).then(|| emails.join(" ")),
            school: None,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub kind: EntryKind,
    pub id: String,
    pub name: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    /// `kind:id`, indexed untokenized so entries can be replaced
    key: Field,
    kind: Field,
    id: Field,
    name: Field,
    email: Field,
    school: Field,
}

/// Tantivy index over the student and sponsor directory.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let key = schema_builder.add_text_field("key", STRING | STORED);
        let kind = schema_builder.add_text_field("kind", STORED);
        let id = schema_builder.add_text_field("id", STORED);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let email = schema_builder.add_text_field("email", TEXT);
        let school = schema_builder.add_text_field("school", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            key,
            kind,
            id,
            name,
            email,
            school,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Replace the whole index with `entries`.
    pub async fn rebuild(&self, entries: &[DirectoryEntry]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for entry in entries {
            writer.add_document(self.create_document(entry))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} entries", entries.len());
        Ok(())
    }

    /// Add or replace a single entry.
    pub async fn index_entry(&self, entry: &DirectoryEntry) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(self.key_term(entry.kind, &entry.id));
        writer.add_document(self.create_document(entry))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Remove an entry from the index.
    pub async fn remove_entry(&self, kind: EntryKind, id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(self.key_term(kind, id));
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search names, emails and schools.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchHit>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.name, self.fields.email, self.fields.school],
        );
        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.email, BOOST_EMAIL),
            (self.fields.school, BOOST_SCHOOL),
        ];
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit + offset))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let hits = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let text = |field: Field| -> Option<String> {
                    Some(doc.get_first(field)?.as_str()?.to_string())
                };
                Some(SearchHit {
                    kind: EntryKind::from_str(&text(self.fields.kind)?)?,
                    id: text(self.fields.id)?,
                    name: text(self.fields.name)?,
                    score,
                })
            })
            .collect();

        Ok(hits)
    }

    fn key_term(&self, kind: EntryKind, id: &str) -> Term {
        Term::from_field_text(self.fields.key, &format!("{}:{}", kind.as_str(), id))
    }

    fn create_document(&self, entry: &DirectoryEntry) -> TantivyDocument {
        doc!(
            self.fields.key => format!("{}:{}", entry.kind.as_str(), entry.id),
            self.fields.kind => entry.kind.as_str().to_string(),
            self.fields.id => entry.id.clone(),
            self.fields.name => entry.name.clone(),
            self.fields.email => entry.email.clone().unwrap_or_default(),
            self.fields.school => entry.school.clone().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(kind: EntryKind, id: &str, name: &str, school: Option<&str>) -> DirectoryEntry {
        DirectoryEntry {
            kind,
            id: id.to_string(),
            name: name.to_string(),
            email: None,
            school: school.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_search_finds_students_and_sponsors() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .rebuild(&[
                entry(EntryKind::Student, "s1", "Amani Njeri", Some("Hillside Primary")),
                entry(EntryKind::Sponsor, "sp1", "Grace Hopper", None),
            ])
            .await
            .unwrap();

        let hits = index.search("hillside", 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, EntryKind::Student);
        assert_eq!(hits[0].id, "s1");

        let hits = index.search("grace", 10, 0).unwrap();
        assert_eq!(hits[0].kind, EntryKind::Sponsor);
        assert_eq!(hits[0].name, "Grace Hopper");
    }

    #[tokio::test]
    async fn test_reindex_replaces_and_remove_deletes() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        index
            .index_entry(&entry(EntryKind::Student, "s1", "Amani Njeri", None))
            .await
            .unwrap();
        index
            .index_entry(&entry(EntryKind::Student, "s1", "Amani Wanjiku", None))
            .await
            .unwrap();

        assert!(index.search("njeri", 10, 0).unwrap().is_empty());
        assert_eq!(index.search("amani", 10, 0).unwrap().len(), 1);

        index.remove_entry(EntryKind::Student, "s1").await.unwrap();
        assert!(index.search("amani", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", 10, 0).unwrap();
        assert!(results.is_empty());
    }
}

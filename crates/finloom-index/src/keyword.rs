//! Full-text keyword index over chunk content.
//!
//! Embedded tantivy index keyed by `chunk_id`, searching content, section
//! title, company name and ticker, with filterable ticker / section /
//! filing-date / company fields. Documents are committed in batches.

use finloom::config::KeywordConfig;
use finloom::error::{FinloomError, Result};
use finloom::types::{Chunk, HitMetadata, SearchHit};
use crate::vector::{FilingPayload, SearchFilters};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexWriter, TantivyDocument, Term, doc};
use tracing::debug;

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Fields {
    chunk_id: Field,
    content: Field,
    section_title: Field,
    company_name: Field,
    ticker: Field,
    section_item: Field,
    filing_date: Field,
    accession_number: Field,
    chunk_index: Field,
}

/// Embedded keyword index.
pub struct KeywordIndex {
    index: Index,
    fields: Fields,
    batch_size: usize,
}

impl std::fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordIndex").finish_non_exhaustive()
    }
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let fields = Fields {
        chunk_id: builder.add_text_field("chunk_id", STRING | STORED),
        content: builder.add_text_field("content", TEXT | STORED),
        section_title: builder.add_text_field("section_title", TEXT | STORED),
        company_name: builder.add_text_field("company_name", TEXT | STORED),
        ticker: builder.add_text_field("ticker", STRING | STORED),
        section_item: builder.add_text_field("section_item", STRING | STORED),
        filing_date: builder.add_text_field("filing_date", STRING | STORED),
        accession_number: builder.add_text_field("accession_number", STRING | STORED),
        chunk_index: builder.add_u64_field("chunk_index", STORED),
    };
    (builder.build(), fields)
}

impl KeywordIndex {
    /// Open (creating if needed) the index under `config.index_dir`.
    pub fn open(config: &KeywordConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.index_dir)?;
        Self::open_in(&config.index_dir, config.batch_size)
    }

    /// Open at an explicit path (tests use a temp dir).
    pub fn open_in(dir: &Path, batch_size: usize) -> Result<Self> {
        let (schema, fields) = build_schema();
        let directory = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        let index = Index::open_or_create(directory, schema)
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        Ok(Self { index, fields, batch_size: batch_size.max(1) })
    }

    /// Add (or replace) chunks; commits every `batch_size` documents and
    /// once at the end.
    pub fn add_chunks(&self, chunks: &[Chunk], filing: &FilingPayload) -> Result<usize> {
        let mut writer: IndexWriter = self
            .index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;

        let mut pending = 0usize;
        for chunk in chunks {
            // chunk_id is the primary key: drop any previous revision
            writer.delete_term(Term::from_field_text(self.fields.chunk_id, &chunk.chunk_id));
            writer
                .add_document(doc!(
                    self.fields.chunk_id => chunk.chunk_id.clone(),
                    self.fields.content => chunk.text.clone(),
                    self.fields.section_title => chunk.section_title.clone(),
                    self.fields.company_name => filing.company_name.clone(),
                    self.fields.ticker => filing.ticker.clone(),
                    self.fields.section_item => chunk.section_item.clone(),
                    self.fields.filing_date => filing.filing_date.clone(),
                    self.fields.accession_number => chunk.accession_number.clone(),
                    self.fields.chunk_index => chunk.chunk_index as u64,
                ))
                .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
            pending += 1;
            if pending % self.batch_size == 0 {
                writer.commit().map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
            }
        }
        writer.commit().map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        debug!(count = pending, "keyword documents committed");
        Ok(pending)
    }

    /// BM25 search over content, section title, company name and ticker.
    pub fn search(&self, query: &str, top_k: usize, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
        let reader = self
            .index
            .reader()
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.content,
                self.fields.section_title,
                self.fields.company_name,
                self.fields.ticker,
            ],
        );
        let text_query = parser
            .parse_query_lenient(query)
            .0;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
        if let Some(ticker) = &filters.ticker {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.ticker, ticker),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        if let Some(section) = &filters.section_item {
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.section_item, section),
                    IndexRecordOption::Basic,
                )),
            ));
        }
        let query: Box<dyn Query> = if clauses.len() == 1 {
            clauses.pop().map(|(_, q)| q).expect("one clause")
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let top = searcher
            .search(&query, &TopDocs::with_limit(top_k.max(1)))
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let document: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
            hits.push(self.hit_from_doc(&document, f64::from(score)));
        }
        Ok(hits)
    }

    fn hit_from_doc(&self, document: &TantivyDocument, score: f64) -> SearchHit {
        let get = |field: Field| -> Option<String> {
            document
                .get_first(field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        let chunk_id = get(self.fields.chunk_id).unwrap_or_default();
        SearchHit {
            key: chunk_id.clone(),
            content: get(self.fields.content).unwrap_or_default(),
            score,
            metadata: HitMetadata {
                chunk_id: Some(chunk_id),
                ticker: get(self.fields.ticker),
                company_name: get(self.fields.company_name),
                section_item: get(self.fields.section_item),
                section_title: get(self.fields.section_title),
                filing_date: get(self.fields.filing_date),
                accession_number: get(self.fields.accession_number),
                fiscal_year: None,
                sources: Vec::new(),
                hop_number: 0,
                edge_type: None,
            },
        }
    }
}

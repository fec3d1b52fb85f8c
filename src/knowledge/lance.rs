//! LanceDB Vector Store - 법률 분야별 컬렉션 저장소
//!
//! 컬렉션 하나가 LanceDB 테이블 하나에 대응합니다.
//! 테이블은 `VECTOR_STORE_PATH` 아래 디스크에 저장되며 재시작 후에도 유지됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{IndexedPoint, PointPayload, ScoredPoint, VectorStore};

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - 저장 디렉토리 경로 (없으면 생성)
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .context("Failed to create vector store directory")?;
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        tracing::info!("Vector store opened: {}", path.display());
        Ok(Self { db })
    }

    /// 컬렉션 테이블 스키마 생성
    fn create_schema(dimension: i32) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("law_domain", DataType::Utf8, false),
            Field::new("article_id", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ]))
    }

    /// 포인트들을 Arrow RecordBatch로 변환
    fn points_to_batch(points: &[IndexedPoint]) -> Result<RecordBatch> {
        let first = points
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty points"))?;
        let dimension = first.vector.len();

        if let Some(bad) = points.iter().find(|p| p.vector.len() != dimension) {
            anyhow::bail!(
                "Dimension mismatch in point {}: expected {}, got {}",
                bad.id,
                dimension,
                bad.vector.len()
            );
        }

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let ids: Vec<i64> = points.iter().map(|p| p.id).collect();

        let vectors_flat: Vec<f32> = points
            .iter()
            .flat_map(|p| p.vector.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(Float32Array::from(vectors_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create vector array")?;

        let batch = RecordBatch::try_new(
            Self::create_schema(dimension),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(payload_column(points, |p| &p.text)),
                Arc::new(payload_column(points, |p| &p.source)),
                Arc::new(payload_column(points, |p| &p.law_domain)),
                Arc::new(payload_column(points, |p| &p.article_id)),
                Arc::new(payload_column(points, |p| &p.title)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::table::Table> {
        self.db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection '{}'", name))
    }
}

fn payload_column(points: &[IndexedPoint], field: impl Fn(&PointPayload) -> &str) -> StringArray {
    StringArray::from(
        points
            .iter()
            .map(|p| field(&p.payload))
            .collect::<Vec<_>>(),
    )
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list collections")?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        if !self.has_collection(name).await? {
            return Ok(false);
        }

        self.db
            .drop_table(name)
            .await
            .with_context(|| format!("Failed to drop collection '{}'", name))?;
        Ok(true)
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;
        self.db
            .create_empty_table(name, Self::create_schema(dimension))
            .execute()
            .await
            .with_context(|| format!("Failed to create collection '{}'", name))?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let batch = Self::points_to_batch(points)?;
        let schema = batch.schema();
        let table = self.open_table(name).await?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(batches)
            .execute()
            .await
            .with_context(|| format!("Failed to add points to '{}'", name))?;

        Ok(points.len())
    }

    async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<ScoredPoint>> {
        if k == 0 || self.count(name).await? == 0 {
            return Ok(vec![]);
        }

        let table = self.open_table(name).await?;

        let results = table
            .vector_search(query.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut points = Vec::new();

        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing id column"))?;
            let texts = string_column(&batch, "text")?;
            let sources = string_column(&batch, "source")?;
            let domains = string_column(&batch, "law_domain")?;
            let articles = string_column(&batch, "article_id")?;
            let titles = string_column(&batch, "title")?;

            // _distance 컬럼 (LanceDB가 자동 추가, 코사인 거리 = 1 - 유사도)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                points.push(ScoredPoint {
                    id: ids.value(i),
                    payload: PointPayload {
                        text: texts.value(i).to_string(),
                        source: sources.value(i).to_string(),
                        law_domain: domains.value(i).to_string(),
                        article_id: articles.value(i).to_string(),
                        title: titles.value(i).to_string(),
                    },
                    similarity: 1.0 - distances.value(i),
                });
            }
        }

        points.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        points.truncate(k);

        Ok(points)
    }

    async fn count(&self, name: &str) -> Result<usize> {
        if !self.has_collection(name).await? {
            return Ok(0);
        }

        let table = self.open_table(name).await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================

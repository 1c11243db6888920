//! Post rows to Parquet.
//!
//! Text columns are nullable except `id`; counts are Int64; both timestamps
//! are UTC with microsecond precision; `curated` is a boolean.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Int64Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::Result;
use crate::models::Post;

pub fn posts_schema() -> SchemaRef {
    let timestamp = DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()));
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("content", DataType::Utf8, true),
        Field::new("author", DataType::Utf8, true),
        Field::new("submolt", DataType::Utf8, true),
        Field::new("url", DataType::Utf8, true),
        Field::new("upvotes", DataType::Int64, false),
        Field::new("downvotes", DataType::Int64, false),
        Field::new("comment_count", DataType::Int64, false),
        Field::new("created_at", timestamp.clone(), true),
        Field::new("fetched_at", timestamp, true),
        Field::new("curated", DataType::Boolean, false),
        Field::new("notes", DataType::Utf8, true),
    ]))
}

fn text<'a>(posts: &'a [Post], f: impl Fn(&'a Post) -> Option<&'a str>) -> ArrayRef {
    Arc::new(StringArray::from(posts.iter().map(f).collect::<Vec<_>>()))
}

fn count(posts: &[Post], f: impl Fn(&Post) -> i64) -> ArrayRef {
    Arc::new(Int64Array::from(posts.iter().map(f).collect::<Vec<_>>()))
}

fn timestamps(posts: &[Post], f: impl Fn(&Post) -> Option<DateTime<Utc>>) -> ArrayRef {
    let micros: Vec<Option<i64>> = posts
        .iter()
        .map(|p| f(p).map(|dt| dt.timestamp_micros()))
        .collect();
    Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))
}

pub fn posts_to_batch(posts: &[Post]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        text(posts, |p| Some(p.id.as_str())),
        text(posts, |p| p.title.as_deref()),
        text(posts, |p| p.content.as_deref()),
        text(posts, |p| p.author.as_deref()),
        text(posts, |p| p.submolt.as_deref()),
        text(posts, |p| p.url.as_deref()),
        count(posts, |p| p.upvotes),
        count(posts, |p| p.downvotes),
        count(posts, |p| p.comment_count),
        timestamps(posts, |p| p.created_at),
        timestamps(posts, |p| p.fetched_at),
        Arc::new(BooleanArray::from(
            posts.iter().map(|p| p.curated).collect::<Vec<_>>(),
        )),
        text(posts, |p| p.notes.as_deref()),
    ];
    Ok(RecordBatch::try_new(posts_schema(), columns)?)
}

/// Write `posts` to a Snappy-compressed Parquet file, creating parent dirs.
/// Returns the size of the written file in bytes.
pub fn write_parquet(path: &Path, posts: &[Post]) -> Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let batch = posts_to_batch(posts)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(std::fs::metadata(path)?.len())
}

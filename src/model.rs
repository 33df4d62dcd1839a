//! Request-side data model: syllabus entries, uploads, and the AI's records.

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One syllabus entry supplied by the caller.
///
/// Unknown fields are ignored so front-ends can attach their own metadata
/// without breaking deserialisation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicDetails {
    pub topic: String,

    #[serde(default)]
    pub subtopics: Vec<String>,

    /// Expected marks (weight) for the topic, when the caller knows it.
    #[serde(default, alias = "weight", skip_serializing_if = "Option::is_none")]
    pub marks: Option<u32>,
}

impl TopicDetails {
    pub fn new(topic: impl Into<String>, subtopics: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            subtopics,
            marks: None,
        }
    }
}

/// One topic-importance record produced by the model.
///
/// Field names match the JSON keys the prompt asks for. The schema is
/// strict: a record carrying any other key fails to parse. `Total_Marks`
/// is read leniently, see [`lenient_marks`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResult {
    #[serde(rename = "Topic")]
    pub topic: String,

    #[serde(rename = "Total_Marks", deserialize_with = "lenient_marks")]
    pub total_marks: i64,

    #[serde(rename = "Important_Subtopics", default)]
    pub important_subtopics: Vec<String>,
}

/// Read a mark total the way models actually write it.
///
/// Accepts an integer, a float (truncated toward zero, so `7.5` is 7), a
/// string holding either, or `null` (0). Anything else is an error.
fn lenient_marks<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    struct MarksVisitor;

    impl Visitor<'_> for MarksVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number of marks")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() {
                Ok(v.trunc() as i64)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            let t = v.trim();
            if let Ok(n) = t.parse::<i64>() {
                return Ok(n);
            }
            match t.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(f.trunc() as i64),
                _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }

        fn visit_none<E: de::Error>(self) -> Result<i64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(MarksVisitor)
}

/// A single uploaded file as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: String,
    /// Declared MIME type; `None` when the client sent none.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<Option<String>>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// A file declared as `application/pdf`.
    pub fn pdf(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(file_name, Some("application/pdf".to_string()), bytes)
    }

    /// Size in kilobytes rounded to two decimals.
    pub fn size_kb(&self) -> f64 {
        size_kb(self.bytes.len())
    }
}

/// `round(bytes / 1024, 2)`.
pub fn size_kb(bytes: usize) -> f64 {
    ((bytes as f64 / 1024.0) * 100.0).round() / 100.0
}

/// One inbound batch: uploads plus the syllabus to match them against.
///
/// Both parts are optional so a malformed request can be represented and
/// rejected by [`crate::process::FilePipeline::handle`].
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub files: Option<Vec<UploadedFile>>,
    pub syllabus: Option<Vec<TopicDetails>>,
}

impl BatchRequest {
    pub fn new(files: Vec<UploadedFile>, syllabus: Vec<TopicDetails>) -> Self {
        Self {
            files: Some(files),
            syllabus: Some(syllabus),
        }
    }
}

/// The syllabus payload as front-ends send it: `{"request": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyllabusEnvelope {
    #[serde(default)]
    pub request: Option<Vec<TopicDetails>>,
}

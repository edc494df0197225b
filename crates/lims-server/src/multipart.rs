//! Multipart form collection
//!
//! Forms here are small (a name, notes and a handful of scans), so every part
//! is buffered in memory before the handler looks at it.

use futures::TryStreamExt;
use warp::multipart::{FormData, Part};
use warp::Buf;

/// Upper bound on a whole form body
pub const MAX_FORM_BYTES: u64 = 256 * 1024 * 1024;

/// One buffered form part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Form field name
    pub name: String,
    /// Client file name, for file inputs
    pub file_name: Option<String>,
    /// Raw contents
    pub data: Vec<u8>,
}

/// A fully buffered form
#[derive(Debug, Clone, Default)]
pub struct Form {
    fields: Vec<Field>,
}

impl Form {
    /// Read every part of `form`
    ///
    /// # Errors
    /// The underlying `warp::Error` if the body is not valid multipart
    pub async fn collect(form: FormData) -> Result<Self, warp::Error> {
        let fields = form.and_then(read_part).try_collect().await?;
        Ok(Self { fields })
    }

    /// First text value of `name`, as sent
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.file_name.is_none())
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    /// First text value of `name`, trimmed; blank values count as absent
    #[must_use]
    pub fn trimmed(&self, name: &str) -> Option<String> {
        self.text(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// File parts named `name` that carry a non-empty file name
    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| {
            f.name == name && f.file_name.as_deref().is_some_and(|n| !n.trim().is_empty())
        })
    }
}

async fn read_part(part: Part) -> Result<Field, warp::Error> {
    let name = part.name().to_string();
    let file_name = part.filename().map(str::to_string);
    let data = part
        .stream()
        .try_fold(Vec::new(), |mut acc, mut buf| async move {
            while buf.has_remaining() {
                let chunk = buf.chunk();
                let len = chunk.len();
                acc.extend_from_slice(chunk);
                buf.advance(len);
            }
            Ok(acc)
        })
        .await?;
    Ok(Field {
        name,
        file_name,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text_field(name: &str, value: &str) -> Field {
        Field {
            name: name.to_string(),
            file_name: None,
            data: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn text_keeps_whitespace_and_trimmed_drops_it() {
        let form = Form {
            fields: vec![
                text_field("notas", "  corona 21\n  carilla 22\n"),
                text_field("paciente", "  Ana  "),
                text_field("case_name", "   "),
            ],
        };

        assert_eq!(form.text("notas").as_deref(), Some("  corona 21\n  carilla 22\n"));
        assert_eq!(form.trimmed("paciente").as_deref(), Some("Ana"));
        assert_eq!(form.text("case_name").as_deref(), Some("   "));
        assert_eq!(form.trimmed("case_name"), None);
        assert_eq!(form.text("missing"), None);
    }

    #[test]
    fn file_parts_are_not_text() {
        let form = Form {
            fields: vec![Field {
                name: "archivos".to_string(),
                file_name: Some("modelo.stl".to_string()),
                data: b"solid".to_vec(),
            }],
        };

        assert_eq!(form.text("archivos"), None);
        assert_eq!(form.files("archivos").count(), 1);
    }
}

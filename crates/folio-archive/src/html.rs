//! Read-only HTML rendering for HTML archives.

use folio_core::{ArchivalDocument, ArchiveFolder, GalleryRef};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one document revision. Field data is rich text and is embedded as is.
pub fn render_document(doc: &ArchivalDocument) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<h1>{}</h1>\n<p class=\"meta\">{} &middot; revision {} &middot; owner {} &middot; modified {}</p>\n",
        escape(&doc.name),
        doc.global_id,
        doc.revision,
        escape(&doc.owner),
        doc.modified_at.to_rfc3339()
    ));
    if !doc.tags.is_empty() {
        let tags: Vec<String> = doc.tags.iter().map(|t| escape(t)).collect();
        body.push_str(&format!("<p class=\"tags\">{}</p>\n", tags.join(", ")));
    }
    for field in &doc.fields {
        body.push_str(&format!(
            "<section class=\"field\">\n<h2>{}</h2>\n<div>{}</div>\n",
            escape(&field.name),
            field.data
        ));
        let media: Vec<String> = field
            .gallery_refs
            .iter()
            .filter_map(GalleryRef::media)
            .map(|m| {
                let href = m
                    .archive_path
                    .as_deref()
                    .map(|p| format!("../../{}/{}", p, escape(&m.file_name)))
                    .unwrap_or_default();
                format!("<li><a href=\"{}\">{}</a></li>", href, escape(&m.name))
            })
            .collect();
        if !media.is_empty() {
            body.push_str(&format!("<ul class=\"attachments\">{}</ul>\n", media.join("")));
        }
        body.push_str("</section>\n");
    }
    page(&doc.name, &body)
}

/// Render the archive index: folders and document links.
pub fn render_index(title: &str, folders: &[ArchiveFolder], documents: &[&ArchivalDocument]) -> String {
    let mut body = format!("<h1>{}</h1>\n", escape(title));
    if !folders.is_empty() {
        body.push_str("<h2>Folders</h2>\n<ul>\n");
        for folder in folders {
            body.push_str(&format!(
                "<li>{} <span class=\"gid\">{}</span></li>\n",
                escape(&folder.name),
                folder.global_id()
            ));
        }
        body.push_str("</ul>\n");
    }
    body.push_str("<h2>Documents</h2>\n<ul>\n");
    for doc in documents {
        body.push_str(&format!(
            "<li><a href=\"{}/{}/{}\">{}</a> <span class=\"gid\">{}</span></li>\n",
            folio_core::defaults::RECORDS_DIR,
            doc.unit_name(),
            folio_core::defaults::DOCUMENT_HTML_FILE,
            escape(&doc.name),
            doc.unit_name()
        ));
    }
    body.push_str("</ul>\n");
    page(title, &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }

    #[test]
    fn test_page_escapes_title() {
        let html = page("<x>", "<p>body</p>");
        assert!(html.contains("<title>&lt;x&gt;</title>"));
        assert!(html.contains("<p>body</p>"));
    }
}

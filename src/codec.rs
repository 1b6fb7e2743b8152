//! XML codec for sidecar metadata documents.
//!
//! The on-disk schema is fixed:
//!
//! ```text
//! <!ELEMENT image (author?,universe?,characters?,tags?)>
//! <!ATTLIST image id ID #REQUIRED filename CDATA #REQUIRED>
//! <!ELEMENT characters (character+)>
//! <!ELEMENT tags (tag+)>
//! ```
//!
//! `decode` rejects any structural deviation with a [`ValidationError`]
//! naming the violation; nothing is ever coerced to a default. `encode` is
//! the left inverse of `decode` for every entity satisfying the data-model
//! invariants, and never emits an empty `characters` or `tags` container.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::models::metadata::ImageMetadata;

/// Fixed order of the optional children beneath `image`.
const CHILD_ORDER: [&str; 4] = ["author", "universe", "characters", "tags"];

/// Parse one sidecar document into an entity.
pub fn decode(text: &str) -> Result<ImageMetadata, ValidationError> {
    let mut reader = Reader::from_str(text);

    let (root, self_closing) = read_root(&mut reader)?;
    let (id, filename) = read_root_attributes(&root)?;
    let mut entity = ImageMetadata::blank(id, filename);

    if !self_closing {
        read_children(&mut reader, &mut entity)?;
    }
    expect_end_of_document(&mut reader)?;

    Ok(entity)
}

/// Serialize an entity to its sidecar document form.
///
/// Output is deterministic: committing the same entity twice produces
/// byte-identical files. Callers are expected to have validated the entity;
/// empty list fields are simply omitted.
pub fn encode(entity: &ImageMetadata) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        r#"<image id="{}" filename="{}""#,
        entity.id,
        escape(&entity.filename)
    ));

    if entity.is_empty() {
        out.push_str(" />");
        return out;
    }
    out.push('>');

    if let Some(author) = &entity.author {
        out.push_str(&format!("<author>{}</author>", escape(author)));
    }
    if let Some(universe) = &entity.universe {
        out.push_str(&format!("<universe>{}</universe>", escape(universe)));
    }
    if !entity.characters.is_empty() {
        out.push_str("<characters>");
        for character in &entity.characters {
            out.push_str(&format!("<character>{}</character>", escape(character)));
        }
        out.push_str("</characters>");
    }
    if !entity.tags.is_empty() {
        out.push_str("<tags>");
        for tag in &entity.tags {
            out.push_str(&format!("<tag>{}</tag>", escape(tag)));
        }
        out.push_str("</tags>");
    }

    out.push_str("</image>");
    out
}

/// Skip prolog noise and return the root start tag.
fn read_root<'a>(
    reader: &mut Reader<&'a [u8]>,
) -> Result<(BytesStart<'a>, bool), ValidationError> {
    loop {
        match reader.read_event() {
            Ok(Event::Decl(_) | Event::Comment(_) | Event::DocType(_) | Event::PI(_)) => continue,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                if !text.trim().is_empty() {
                    return Err(ValidationError::UnexpectedText(text.into_owned()));
                }
            }
            Ok(Event::Start(e)) => {
                ensure_root_name(&e)?;
                return Ok((e, false));
            }
            Ok(Event::Empty(e)) => {
                ensure_root_name(&e)?;
                return Ok((e, true));
            }
            Ok(Event::Eof) => {
                return Err(ValidationError::Malformed("empty document".into()));
            }
            Ok(other) => {
                return Err(ValidationError::Malformed(format!(
                    "unexpected {:?} before root element",
                    other
                )));
            }
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
        }
    }
}

fn ensure_root_name(start: &BytesStart<'_>) -> Result<(), ValidationError> {
    if start.name().as_ref() != b"image" {
        return Err(ValidationError::UnexpectedRoot(
            String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ));
    }
    Ok(())
}

/// Extract the required `id` and `filename` attributes, rejecting extras.
fn read_root_attributes(root: &BytesStart<'_>) -> Result<(Uuid, String), ValidationError> {
    let mut id = None;
    let mut filename = None;

    for attr in root.attributes() {
        let attr = attr.map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        match attr.key.as_ref() {
            b"id" => {
                id = Some(
                    Uuid::parse_str(&value)
                        .map_err(|_| ValidationError::InvalidId(value.clone().into_owned()))?,
                );
            }
            b"filename" => filename = Some(value.into_owned()),
            other => {
                return Err(ValidationError::UnknownAttribute(
                    String::from_utf8_lossy(other).into_owned(),
                ));
            }
        }
    }

    let id = id.ok_or(ValidationError::MissingAttribute("id"))?;
    let filename = filename.ok_or(ValidationError::MissingAttribute("filename"))?;
    Ok((id, filename))
}

/// Resolve a child element name to its schema slot and advance the order
/// cursor, rejecting unknown, duplicated, or out-of-order elements.
fn claim_slot(name: &[u8], next_allowed: &mut usize) -> Result<usize, ValidationError> {
    let name = String::from_utf8_lossy(name).into_owned();
    let slot = CHILD_ORDER
        .iter()
        .position(|candidate| *candidate == name)
        .ok_or_else(|| ValidationError::UnexpectedElement(name.clone()))?;
    if slot < *next_allowed {
        return Err(ValidationError::OutOfOrder(name));
    }
    *next_allowed = slot + 1;
    Ok(slot)
}

/// Read the `image` children up to `</image>`, enforcing the fixed order
/// and at-most-once rule for each.
fn read_children(
    reader: &mut Reader<&[u8]>,
    entity: &mut ImageMetadata,
) -> Result<(), ValidationError> {
    // Index into CHILD_ORDER below which further elements are rejected.
    let mut next_allowed = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Comment(_)) => continue,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                if !text.trim().is_empty() {
                    return Err(ValidationError::UnexpectedText(text.into_owned()));
                }
            }
            Ok(Event::Start(e)) => {
                let slot = claim_slot(e.name().as_ref(), &mut next_allowed)?;
                match slot {
                    0 => entity.author = Some(read_text(reader, b"author")?),
                    1 => entity.universe = Some(read_text(reader, b"universe")?),
                    2 => {
                        entity.characters =
                            read_container(reader, "characters", b"character")?;
                    }
                    _ => entity.tags = read_container(reader, "tags", b"tag")?,
                }
            }
            Ok(Event::Empty(e)) => {
                // A self-closing leaf carries empty text; a self-closing
                // container has zero children and is rejected.
                let slot = claim_slot(e.name().as_ref(), &mut next_allowed)?;
                match slot {
                    0 => entity.author = Some(String::new()),
                    1 => entity.universe = Some(String::new()),
                    2 => return Err(ValidationError::EmptyContainer("characters")),
                    _ => return Err(ValidationError::EmptyContainer("tags")),
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"image" => return Ok(()),
            Ok(Event::End(e)) => {
                return Err(ValidationError::UnexpectedElement(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => {
                return Err(ValidationError::Malformed("unclosed `image` element".into()));
            }
            Ok(other) => {
                return Err(ValidationError::Malformed(format!(
                    "unexpected {:?} inside `image`",
                    other
                )));
            }
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
        }
    }
}

/// Read the text content of a leaf element up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>, name: &[u8]) -> Result<String, ValidationError> {
    let mut content = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                content.push_str(
                    &t.unescape()
                        .map_err(|e| ValidationError::Malformed(e.to_string()))?,
                );
            }
            Ok(Event::CData(c)) => {
                content.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::Comment(_)) => continue,
            Ok(Event::End(e)) if e.name().as_ref() == name => return Ok(content),
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Err(ValidationError::UnexpectedElement(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => {
                return Err(ValidationError::Malformed(format!(
                    "unclosed `{}` element",
                    String::from_utf8_lossy(name)
                )));
            }
            Ok(other) => {
                return Err(ValidationError::Malformed(format!(
                    "unexpected {:?} in text element",
                    other
                )));
            }
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
        }
    }
}

/// Read a `characters`/`tags` container, requiring at least one item.
fn read_container(
    reader: &mut Reader<&[u8]>,
    container: &'static str,
    item: &[u8],
) -> Result<Vec<String>, ValidationError> {
    let mut items = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Comment(_)) => continue,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                if !text.trim().is_empty() {
                    return Err(ValidationError::UnexpectedText(text.into_owned()));
                }
            }
            Ok(Event::Start(e)) if e.name().as_ref() == item => {
                items.push(read_text(reader, item)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == item => {
                // `<character/>` carries no text; treat as the empty string
                // so nothing is silently dropped.
                items.push(String::new());
            }
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Err(ValidationError::UnexpectedElement(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::End(e)) if e.name().as_ref() == container.as_bytes() => {
                if items.is_empty() {
                    return Err(ValidationError::EmptyContainer(container));
                }
                return Ok(items);
            }
            Ok(Event::End(e)) => {
                return Err(ValidationError::UnexpectedElement(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => {
                return Err(ValidationError::Malformed(format!(
                    "unclosed `{container}` element"
                )));
            }
            Ok(other) => {
                return Err(ValidationError::Malformed(format!(
                    "unexpected {:?} inside `{container}`",
                    other
                )));
            }
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
        }
    }
}

/// After the root element closes, only whitespace and comments may follow.
fn expect_end_of_document(reader: &mut Reader<&[u8]>) -> Result<(), ValidationError> {
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(Event::Comment(_)) => continue,
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                if !text.trim().is_empty() {
                    return Err(ValidationError::TrailingContent);
                }
            }
            Ok(_) => return Err(ValidationError::TrailingContent),
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
        }
    }
}

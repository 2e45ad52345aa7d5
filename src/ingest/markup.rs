use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::IngestError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub tail: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn is(&self, name: &str, type_attr: &str) -> bool {
        self.name == name && self.attr("TYPE") == Some(type_attr)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn descendants<'a>(
        &'a self,
        predicate: &dyn Fn(&XmlElement) -> bool,
    ) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        collect_descendants(self, predicate, &mut out);
        out
    }
}

fn collect_descendants<'a>(
    element: &'a XmlElement,
    predicate: &dyn Fn(&XmlElement) -> bool,
    out: &mut Vec<&'a XmlElement>,
) {
    for child in &element.children {
        if predicate(child) {
            out.push(child);
        }
        collect_descendants(child, predicate, out);
    }
}

pub fn parse_file(path: &Path) -> Result<XmlElement> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    build_tree(BufReader::new(file), &path.display().to_string())
}

#[cfg(test)]
pub fn parse_bytes(bytes: &[u8], origin: &str) -> Result<XmlElement> {
    build_tree(bytes, origin)
}

pub fn validate_file(path: &Path) -> Result<()> {
    parse_file(path).map(|_| ())
}

fn build_tree<R: BufRead>(source: R, origin: &str) -> Result<XmlElement> {
    let invalid = |detail: String| IngestError::Validation {
        path: origin.to_string(),
        detail,
    };

    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| invalid(format!("{err} (at byte {})", reader.buffer_position())))?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(invalid("content after the root element".to_string()).into());
                }
                stack.push(open_element(&start).map_err(invalid)?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(invalid("content after the root element".to_string()).into());
                }
                let element = open_element(&start).map_err(invalid)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(end) => {
                let name = utf8(end.name().as_ref(), "closing tag name").map_err(invalid)?;
                let Some(element) = stack.pop() else {
                    return Err(invalid(format!("unexpected closing tag </{name}>")).into());
                };
                if element.name != name {
                    return Err(invalid(format!(
                        "closing tag </{name}> does not match <{}>",
                        element.name
                    ))
                    .into());
                }
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let decoded = text.unescape().map_err(|err| {
                    let position = reader.buffer_position();
                    invalid(format!("bad text content: {err} (at byte {position})"))
                })?;
                push_text(&mut stack, &decoded).map_err(invalid)?;
            }
            Event::CData(data) => {
                let decoded = utf8(&data.into_inner(), "CDATA section").map_err(invalid)?;
                push_text(&mut stack, &decoded).map_err(invalid)?;
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(invalid(format!("unclosed element <{}>", open.name)).into());
    }

    root.ok_or_else(|| invalid("document has no root element".to_string()).into())
}

fn open_element(start: &BytesStart<'_>) -> std::result::Result<XmlElement, String> {
    let name = utf8(start.name().as_ref(), "element name")?;
    let mut attributes = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| format!("bad attribute on <{name}>: {err}"))?;
        let key = utf8(attribute.key.as_ref(), "attribute name")?;
        let value = attribute
            .unescape_value()
            .map_err(|err| format!("bad value for {key} on <{name}>: {err}"))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        ..XmlElement::default()
    })
}

fn utf8(bytes: &[u8], what: &str) -> std::result::Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| format!("{what} is not valid UTF-8: {err}"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [XmlElement], text: &str) -> std::result::Result<(), String> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err("text outside the root element".to_string());
    };

    match parent.children.last_mut() {
        Some(previous) => previous.tail.push_str(text),
        None => parent.text.push_str(text),
    }
    Ok(())
}

pub fn flatten_text(element: &XmlElement) -> String {
    let mut fragments = vec![Cow::Borrowed(element.text.as_str())];
    for child in &element.children {
        fragments.push(Cow::Owned(flatten_text(child)));
        fragments.push(Cow::Borrowed(child.tail.as_str()));
    }
    fragments.join(" ").trim().to_string()
}

pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    collapsed
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

pub fn flattened_clean(element: &XmlElement) -> String {
    clean_text(&flatten_text(element))
}

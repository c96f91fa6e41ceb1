use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use super::{ArchiveError, EntrySource, Visitor, ZipSource, is_image_name, natural_cmp};

/// Directory names that usually hold the illustrations of an epub.
const IMAGE_DIRS: &[&str] = &["images", "image", "img"];

/// An epub read as an image container.
///
/// Page order puts the declared cover first, then anything under an
/// `images`/`image`/`img` directory, then the remaining entries.
pub struct EpubSource {
    inner: ZipSource,
    cover: Option<String>,
}

impl EpubSource {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut inner = ZipSource::open(path)?;
        let names = inner.names()?;
        let cover = find_cover_entry(&mut inner, &names);
        if let Some(ref c) = cover {
            debug!("{}: epub cover {c}", path.display());
        }
        inner.set_order(&preferred_order(&names, cover.as_deref()));
        Ok(Self { inner, cover })
    }

    /// The manifest cover image, if the package declares one that exists.
    pub fn cover_entry(&self) -> Option<&str> {
        self.cover.as_deref()
    }
}

impl EntrySource for EpubSource {
    fn names(&mut self) -> Result<Vec<String>, ArchiveError> {
        self.inner.names()
    }

    fn visit(&mut self, visit: &mut Visitor<'_>) -> Result<(), ArchiveError> {
        self.inner.visit(visit)
    }
}

fn preferred_order(names: &[String], cover: Option<&str>) -> Vec<String> {
    let mut in_image_dir: Vec<&String> = names
        .iter()
        .filter(|n| Some(n.as_str()) != cover && is_image_name(n) && under_image_dir(n))
        .collect();
    in_image_dir.sort_by(|a, b| natural_cmp(a, b));

    let mut order = Vec::with_capacity(names.len());
    if let Some(c) = cover {
        order.push(c.to_string());
    }
    order.extend(in_image_dir.into_iter().cloned());
    order
}

fn under_image_dir(name: &str) -> bool {
    let mut segments: Vec<&str> = name.split('/').collect();
    segments.pop();
    segments
        .iter()
        .any(|s| IMAGE_DIRS.iter().any(|d| s.eq_ignore_ascii_case(d)))
}

fn find_cover_entry(zip: &mut ZipSource, names: &[String]) -> Option<String> {
    let opf_path = match zip.read("META-INF/container.xml") {
        Ok(data) => parse_container_rootfile(&data),
        Err(_) => None,
    }
    .or_else(|| names.iter().find(|n| n.ends_with(".opf")).cloned())?;

    let opf = zip.read(&opf_path).ok()?;
    let href = parse_opf_cover(&opf)?;
    let opf_dir = match opf_path.rfind('/') {
        Some(i) => &opf_path[..=i],
        None => "",
    };
    let resolved = resolve_path(opf_dir, &href);
    names.iter().find(|n| **n == resolved).cloned()
}

fn parse_container_rootfile(data: &[u8]) -> Option<String> {
    let mut xml = Reader::from_reader(data);
    xml.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) | Err(_) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) == "rootfile" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"full-path" {
                            return Some(attr.decode_and_unescape_value(xml.decoder()).unwrap_or_default().to_string());
                        }
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }
    None
}

struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

/// Href of the cover image declared by an OPF package, relative to the OPF.
///
/// Checks `properties="cover-image"`, then `<meta name="cover">`, then an
/// image item with id `cover`.
fn parse_opf_cover(opf: &[u8]) -> Option<String> {
    let mut cover_id: Option<String> = None;
    let mut manifest: Vec<ManifestItem> = Vec::new();

    let mut xml = Reader::from_reader(opf);
    xml.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) | Err(_) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()).as_str() {
                    "item" => {
                        let mut item = ManifestItem {
                            id: String::new(),
                            href: String::new(),
                            media_type: String::new(),
                            properties: String::new(),
                        };
                        for attr in e.attributes().flatten() {
                            let val = attr.decode_and_unescape_value(xml.decoder()).unwrap_or_default().to_string();
                            match attr.key.as_ref() {
                                b"id" => item.id = val,
                                b"href" => item.href = val,
                                b"media-type" => item.media_type = val,
                                b"properties" => item.properties = val,
                                _ => {}
                            }
                        }
                        manifest.push(item);
                    }
                    "meta" => {
                        let mut name = String::new();
                        let mut content = String::new();
                        for attr in e.attributes().flatten() {
                            let val = attr.decode_and_unescape_value(xml.decoder()).unwrap_or_default().to_string();
                            match attr.key.as_ref() {
                                b"name" => name = val,
                                b"content" => content = val,
                                _ => {}
                            }
                        }
                        if name == "cover" && !content.is_empty() {
                            cover_id = Some(content);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    let images = || manifest.iter().filter(|i| i.media_type.starts_with("image/"));
    images()
        .find(|i| i.properties.split_whitespace().any(|p| p == "cover-image"))
        .or_else(|| {
            cover_id
                .as_ref()
                .and_then(|cid| images().find(|i| &i.id == cid))
        })
        .or_else(|| images().find(|i| i.id.eq_ignore_ascii_case("cover")))
        .map(|i| i.href.clone())
}

fn local_name(raw: &[u8]) -> String {
    let s = std::str::from_utf8(raw).unwrap_or("");
    match s.rfind(':') {
        Some(i) => s[i + 1..].to_lowercase(),
        None => s.to_lowercase(),
    }
}

fn resolve_path(base_dir: &str, href: &str) -> String {
    if let Some(abs) = href.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

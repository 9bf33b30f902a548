//! FGDC CSDGM XML parser using quick-xml
//!
//! Streams the document once and keeps the first occurrence of each
//! single-valued element. `idinfo` precedes lineage and metadata sections in
//! CSDGM, so the first `title` is the dataset's own citation title.

use std::borrow::Cow;

use depoline_core::TransformError;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;

/// Fields the crosswalk reads from an FGDC document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FgdcRecord {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub purpose: Option<String>,
    pub supplemental: Option<String>,
    pub originators: Vec<String>,
    pub pubdate: Option<String>,
    /// `metd`, used when the citation has no usable publication date.
    pub metadata_date: Option<String>,
    pub theme_keywords: Vec<String>,
    pub place_keywords: Vec<String>,
    pub online_links: Vec<String>,
    pub use_constraints: Option<String>,
}

fn first(slot: &mut Option<String>, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn parse_error(e: impl std::fmt::Display) -> TransformError {
    TransformError::Parse(e.to_string())
}

/// Collapse runs of whitespace (FGDC text is often hard-wrapped).
fn clean(raw: &str) -> Result<Option<String>, TransformError> {
    let text: Cow<'_, str> = unescape(raw).map_err(parse_error)?;
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(Some(collapsed).filter(|s| !s.is_empty()))
}

pub fn parse_fgdc(xml: &str) -> Result<FgdcRecord, TransformError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut record = FgdcRecord::default();
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                saw_root = true;
                let name = e.name();
                let field = match name.as_ref() {
                    b"title" | b"abstract" | b"purpose" | b"supplinf" | b"origin" | b"pubdate"
                    | b"metd" | b"themekey" | b"placekey" | b"onlink" | b"useconst" => {
                        name.as_ref().to_vec()
                    }
                    _ => continue,
                };
                let raw = reader.read_text(name).map_err(parse_error)?;
                let Some(text) = clean(&raw)? else {
                    continue;
                };
                match field.as_slice() {
                    b"title" => first(&mut record.title, text),
                    b"abstract" => first(&mut record.abstract_text, text),
                    b"purpose" => first(&mut record.purpose, text),
                    b"supplinf" => first(&mut record.supplemental, text),
                    b"pubdate" => first(&mut record.pubdate, text),
                    b"metd" => first(&mut record.metadata_date, text),
                    b"useconst" => first(&mut record.use_constraints, text),
                    b"origin" => push_unique(&mut record.originators, text),
                    b"themekey" => push_unique(&mut record.theme_keywords, text),
                    b"placekey" => push_unique(&mut record.place_keywords, text),
                    b"onlink" => push_unique(&mut record.online_links, text),
                    _ => {}
                }
            }
            Event::Empty(_) => saw_root = true,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(TransformError::Parse("document has no elements".into()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <idinfo>
    <citation>
      <citeinfo>
        <origin>Smith, Jane</origin>
        <origin>Fisheries Agency of Japan</origin>
        <pubdate>20030115</pubdate>
        <title>Bering Sea
          zooplankton biomass &amp; composition</title>
        <onlink>https://example.org/data/bs-zoo</onlink>
        <lworkcit><citeinfo><title>Larger Work</title></citeinfo></lworkcit>
      </citeinfo>
    </citation>
    <descript>
      <abstract>Net tow biomass estimates.</abstract>
      <purpose>Ecosystem monitoring.</purpose>
    </descript>
    <keywords>
      <theme><themekt>None</themekt><themekey>zooplankton</themekey><themekey>biomass</themekey></theme>
      <place><placekey>Bering Sea</placekey><placekey>Bering Sea</placekey></place>
    </keywords>
    <useconst>CC-BY 4.0</useconst>
  </idinfo>
  <metainfo><metd>20040301</metd></metainfo>
</metadata>"#;

    #[test]
    fn extracts_fields() {
        let r = parse_fgdc(SAMPLE).unwrap();
        assert_eq!(r.title.as_deref(), Some("Bering Sea zooplankton biomass & composition"));
        assert_eq!(r.originators, ["Smith, Jane", "Fisheries Agency of Japan"]);
        assert_eq!(r.pubdate.as_deref(), Some("20030115"));
        assert_eq!(r.metadata_date.as_deref(), Some("20040301"));
        assert_eq!(r.abstract_text.as_deref(), Some("Net tow biomass estimates."));
        assert_eq!(r.purpose.as_deref(), Some("Ecosystem monitoring."));
        assert_eq!(r.theme_keywords, ["zooplankton", "biomass"]);
        assert_eq!(r.place_keywords, ["Bering Sea"]);
        assert_eq!(r.online_links, ["https://example.org/data/bs-zoo"]);
        assert_eq!(r.use_constraints.as_deref(), Some("CC-BY 4.0"));
    }

    #[test]
    fn empty_elements_are_ignored() {
        let r = parse_fgdc("<metadata><idinfo><title>  </title><abstract/></idinfo></metadata>").unwrap();
        assert_eq!(r.title, None);
        assert_eq!(r.abstract_text, None);
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let err = parse_fgdc("<metadata><title>x</metadata>").unwrap_err();
        assert!(matches!(err, TransformError::Parse(_)));
    }

    #[test]
    fn empty_document_is_parse_error() {
        assert!(matches!(parse_fgdc(""), Err(TransformError::Parse(_))));
    }
}

//! Just-enough XML scanning for the device descriptor: elements by local
//! name, any namespace prefix. The descriptor never nests same-named
//! elements and attribute values are not needed.

/// Next element named `local`, scanning from byte offset `from`. Returns
/// the inner text and the offset just past the closing tag.
pub(crate) fn next_element<'a>(xml: &'a str, local: &str, from: usize) -> Option<(&'a str, usize)> {
    let mut at = from;
    loop {
        let open = xml[at..].find('<')? + at;
        let rest = &xml[open + 1..];
        if rest.starts_with('/') || rest.starts_with('!') || rest.starts_with('?') {
            at = open + 1;
            continue;
        }
        let name_len = rest
            .find(|c: char| c == '>' || c == '/' || c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let tag_end = xml[open..].find('>')? + open;
        if local_name(&rest[..name_len]) != local {
            // keep scanning inside the element, services can sit at any depth
            at = tag_end + 1;
            continue;
        }
        if xml[..tag_end].ends_with('/') {
            return Some((&xml[tag_end..tag_end], tag_end + 1));
        }
        let inner_start = tag_end + 1;
        let (inner_end, close_end) = find_close(xml, local, inner_start)?;
        return Some((&xml[inner_start..inner_end], close_end));
    }
}

pub(crate) fn element_text<'a>(xml: &'a str, local: &str) -> Option<&'a str> {
    next_element(xml, local, 0).map(|(inner, _)| inner)
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn find_close(xml: &str, local: &str, from: usize) -> Option<(usize, usize)> {
    let mut at = from;
    loop {
        let open = xml[at..].find("</")? + at;
        let rest = &xml[open + 2..];
        let name_len = rest
            .find(|c: char| c == '>' || c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let end = xml[open..].find('>')? + open;
        if local_name(&rest[..name_len]) == local {
            return Some((open, end + 1));
        }
        at = end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        "<?xml version=\"1.0\"?>\n",
        "<root xmlns:av=\"urn:schemas-sony-com:av\">\n",
        "  <av:Info>\n",
        "    <av:Version>1.0</av:Version>\n",
        "    <av:Entry><av:Name>guide</av:Name></av:Entry>\n",
        "    <av:Entry><av:Name>camera</av:Name></av:Entry>\n",
        "    <av:Empty/>\n",
        "  </av:Info>\n",
        "</root>\n",
    );

    #[test]
    fn finds_prefixed_elements_by_local_name() {
        assert_eq!(element_text(DOC, "Version"), Some("1.0"));
    }

    #[test]
    fn iterates_repeated_elements_in_order() {
        let (first, next) = next_element(DOC, "Entry", 0).unwrap();
        assert_eq!(element_text(first, "Name"), Some("guide"));
        let (second, _) = next_element(DOC, "Entry", next).unwrap();
        assert_eq!(element_text(second, "Name"), Some("camera"));
        let (_, after) = next_element(DOC, "Entry", next).unwrap();
        assert!(next_element(DOC, "Entry", after).is_none());
    }

    #[test]
    fn self_closing_element_has_empty_text() {
        assert_eq!(element_text(DOC, "Empty"), Some(""));
    }

    #[test]
    fn missing_element_is_none() {
        assert_eq!(element_text(DOC, "Nope"), None);
    }
}

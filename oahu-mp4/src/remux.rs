//! Edits that turn a protected file layout into a plain one.

use crate::{
    Error, FourCC, Result,
    boxes::{BoxData, Mp4Tree},
};

/// Boxes that only make sense for protected content.
const PROTECTION_BOXES: [&[u8; 4]; 6] = [b"sinf", b"adrm", b"senc", b"saiz", b"saio", b"pssh"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Sample entries renamed to their original format.
    pub sample_entries: usize,
    /// Boxes turned into `free` boxes.
    pub neutralized: usize,
}

/// Renames protected sample entries to their original codec and blanks out
/// every protection box with a `free` box of the same size, so no sample
/// offset in the file changes.
pub fn strip_protection(tree: &mut Mp4Tree) -> Result<StripReport> {
    let mut report = StripReport::default();

    let protected = [b"enca", b"aavd", b"encv"]
        .into_iter()
        .flat_map(|x| tree.find_all(x))
        .collect::<Vec<_>>();

    for entry in protected {
        let current = tree.box_type(entry);
        let original = match tree
            .find_path(Some(entry), "sinf/frma")
            .map(|x| tree.data(x))
        {
            Some(BoxData::Frma(x)) => x.data_format,
            _ if current.is_protected_audio() => FourCC(*b"mp4a"),
            _ => {
                return Err(Error::unsupported(format!(
                    "'{}' sample entry without an original format",
                    current
                )));
            }
        };

        log::debug!("sample entry '{}' becomes '{}'", current, original);
        tree.set_box_type(entry, original);
        report.sample_entries += 1;
    }

    for box_type in PROTECTION_BOXES {
        for id in tree.find_all(box_type) {
            tree.neutralize(id)?;
            report.neutralized += 1;
        }
    }

    log::info!(
        "stripped protection from {} sample entries, {} boxes blanked",
        report.sample_entries,
        report.neutralized
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::FrmaBox;

    #[test]
    fn test_strip_keeps_sizes() {
        let mut tree = Mp4Tree::new();
        let entry = tree
            .append(None, FourCC(*b"enca"), BoxData::Unknown(vec![0; 28]))
            .unwrap();
        let sinf = tree
            .append(Some(entry), FourCC(*b"sinf"), BoxData::Container)
            .unwrap();
        tree.append(
            Some(sinf),
            FourCC(*b"frma"),
            FrmaBox {
                data_format: FourCC(*b"mp4a"),
            }
            .into(),
        )
        .unwrap();
        let pssh = tree
            .append(None, FourCC(*b"pssh"), BoxData::Unknown(vec![7; 20]))
            .unwrap();

        let before = [tree.render_size(entry), tree.render_size(pssh)];
        let report = strip_protection(&mut tree).unwrap();

        assert_eq!(report.sample_entries, 1);
        assert_eq!(report.neutralized, 2);
        assert_eq!(tree.box_type(entry), b"mp4a");
        assert_eq!(tree.box_type(pssh), b"free");
        assert_eq!(tree.box_type(sinf), b"free");
        assert_eq!(before, [tree.render_size(entry), tree.render_size(pssh)]);
    }
}

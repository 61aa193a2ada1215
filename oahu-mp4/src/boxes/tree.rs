use super::{BoxData, BoxHeader};
use crate::{Error, FourCC, Result, Writer};
use std::{fmt, io::Write};

/// Index of a node inside its [`Mp4Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(pub(crate) usize);

#[derive(Clone, Debug)]
pub struct Node {
    pub header: BoxHeader,
    pub parent: Option<BoxId>,
    pub children: Vec<BoxId>,
    pub data: BoxData,
}

/// Arena holding a forest of boxes in file order.
///
/// Nodes are never removed from the arena. Detaching a node only unlinks it
/// from its parent, so ids held by callers stay valid.
#[derive(Clone, Debug, Default)]
pub struct Mp4Tree {
    nodes: Vec<Node>,
    roots: Vec<BoxId>,
}

impl Mp4Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[BoxId] {
        &self.roots
    }

    pub fn node(&self, id: BoxId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: BoxId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn header(&self, id: BoxId) -> &BoxHeader {
        &self.nodes[id.0].header
    }

    pub fn box_type(&self, id: BoxId) -> FourCC {
        self.nodes[id.0].header.box_type
    }

    pub fn data(&self, id: BoxId) -> &BoxData {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: BoxId) -> &mut BoxData {
        &mut self.nodes[id.0].data
    }

    pub fn parent(&self, id: BoxId) -> Option<BoxId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: BoxId) -> &[BoxId] {
        &self.nodes[id.0].children
    }

    /// Adds a parsed node. The caller fills in its data afterwards.
    pub(crate) fn push(&mut self, header: BoxHeader, parent: Option<BoxId>) -> BoxId {
        let id = BoxId(self.nodes.len());
        self.nodes.push(Node {
            header,
            parent,
            children: Vec::new(),
            data: BoxData::Container,
        });

        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    /* Navigation */

    pub fn child(&self, id: BoxId, box_type: &[u8; 4]) -> Option<BoxId> {
        self.children_of_type(id, box_type).next()
    }

    pub fn children_of_type<'a>(
        &'a self,
        id: BoxId,
        box_type: &'a [u8; 4],
    ) -> impl Iterator<Item = BoxId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |x| self.box_type(*x) == box_type)
    }

    pub fn root(&self, box_type: &[u8; 4]) -> Option<BoxId> {
        self.roots
            .iter()
            .copied()
            .find(|x| self.box_type(*x) == box_type)
    }

    /// Follows a slash separated path such as `moov/trak/mdia`, taking the
    /// first match at every level. `from` of `None` starts at the roots.
    pub fn find_path(&self, from: Option<BoxId>, path: &str) -> Option<BoxId> {
        let mut current = from;

        for name in path.split('/').filter(|x| !x.is_empty()) {
            let box_type: [u8; 4] = name.as_bytes().try_into().ok()?;
            current = Some(match current {
                Some(id) => self.child(id, &box_type)?,
                None => self.root(&box_type)?,
            });
        }

        current
    }

    /// Depth-first walk of `id` and everything below it, in file order.
    pub fn descendants(&self, id: BoxId) -> Vec<BoxId> {
        let mut out = Vec::new();
        let mut stack = vec![id];

        while let Some(x) = stack.pop() {
            out.push(x);
            stack.extend(self.children(x).iter().rev());
        }

        out
    }

    /// Every attached box with the given type, in file order.
    pub fn find_all(&self, box_type: &[u8; 4]) -> Vec<BoxId> {
        self.roots
            .iter()
            .flat_map(|x| self.descendants(*x))
            .filter(|x| self.box_type(*x) == box_type)
            .collect()
    }

    pub fn ancestor(&self, id: BoxId, box_type: &[u8; 4]) -> Option<BoxId> {
        let mut current = self.parent(id);

        while let Some(x) = current {
            if self.box_type(x) == box_type {
                return Some(x);
            }
            current = self.parent(x);
        }

        None
    }

    /// Media handler (`soun`, `vide`, `text`...) of the track containing `id`.
    pub fn handler_type(&self, id: BoxId) -> Option<FourCC> {
        let mdia = if self.box_type(id) == b"mdia" {
            id
        } else {
            self.ancestor(id, b"mdia")?
        };

        match self.data(self.child(mdia, b"hdlr")?) {
            BoxData::Hdlr(x) => Some(x.handler_type),
            _ => None,
        }
    }

    /* Edits */

    pub fn set_box_type(&mut self, id: BoxId, box_type: FourCC) {
        self.nodes[id.0].header.box_type = box_type;
    }

    /// Unlinks a box from its parent (or the roots).
    pub fn detach(&mut self, id: BoxId) {
        match self.nodes[id.0].parent.take() {
            Some(parent) => self.nodes[parent.0].children.retain(|x| *x != id),
            None => self.roots.retain(|x| *x != id),
        }
    }

    /// Turns a box into a `free` box of exactly the same rendered size, so
    /// every offset after it stays valid.
    pub fn neutralize(&mut self, id: BoxId) -> Result<()> {
        let size = self.render_size(id);
        let mut payload = Vec::new();
        self.write_payload(id, &mut Writer::new(&mut payload))?;

        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }

        let node = &mut self.nodes[id.0];
        node.header.box_type = FourCC(*b"free");
        node.data = BoxData::Unknown(payload);
        debug_assert_eq!(size, self.render_size(id));
        Ok(())
    }

    /// Appends a new box to `parent` (or the roots) with a header computed
    /// from the payload being authored.
    pub fn append(
        &mut self,
        parent: Option<BoxId>,
        box_type: FourCC,
        data: BoxData,
    ) -> Result<BoxId> {
        let payload = data.fields_size();
        let large = payload + 8 > u32::MAX as u64;
        let header = BoxHeader::new(payload + if large { 16 } else { 8 }, box_type)?;

        let id = self.push(header, parent);
        self.nodes[id.0].data = data;

        // Authored ancestors grow with every child.
        let mut ancestor = parent;
        while let Some(x) = ancestor {
            self.nodes[x.0].header.total_box_size = self.render_size(x);
            ancestor = self.nodes[x.0].parent;
        }
        Ok(id)
    }

    /* Rendering */

    pub fn payload_size(&self, id: BoxId) -> u64 {
        let node = &self.nodes[id.0];
        node.data.fields_size()
            + node
                .children
                .iter()
                .map(|x| self.render_size(*x))
                .sum::<u64>()
    }

    /// Header plus fields plus children, recomputed from the current state.
    pub fn render_size(&self, id: BoxId) -> u64 {
        let payload = self.payload_size(id);
        payload + self.header(id).render_header_size(payload)
    }

    fn write_payload(&self, id: BoxId, writer: &mut Writer) -> Result<()> {
        let node = &self.nodes[id.0];
        node.data.write_fields(writer)?;

        for child in &node.children {
            self.write_box(*child, writer)?;
        }

        Ok(())
    }

    fn write_box(&self, id: BoxId, writer: &mut Writer) -> Result<()> {
        let start = writer.written();
        let payload = self.payload_size(id);
        self.header(id).write(payload, writer)?;
        self.write_payload(id, writer)?;

        let written = writer.written() - start;
        let expected = self.render_size(id);
        if written != expected {
            return Err(Error::invalid_input(format!(
                "'{}' box rendered {} bytes but its size is {}",
                self.box_type(id),
                written,
                expected
            )));
        }

        Ok(())
    }

    /// Renders one box (and its children) to `out`.
    pub fn write(&self, id: BoxId, out: &mut dyn Write) -> Result<u64> {
        let mut writer = Writer::new(out);
        self.write_box(id, &mut writer)?;
        Ok(writer.written())
    }

    /// Renders every root box in order.
    pub fn write_all(&self, out: &mut dyn Write) -> Result<u64> {
        let mut writer = Writer::new(out);
        for id in &self.roots {
            self.write_box(*id, &mut writer)?;
        }
        Ok(writer.written())
    }

    /// Indented listing of the tree, limited to `max_depth` levels.
    pub fn dump(&self, max_depth: usize) -> String {
        let mut out = String::new();
        for id in &self.roots {
            self.dump_node(*id, 0, max_depth, &mut out);
        }
        out
    }

    fn dump_node(&self, id: BoxId, depth: usize, max_depth: usize, out: &mut String) {
        if depth >= max_depth {
            return;
        }

        let header = self.header(id);
        out.push_str(&format!(
            "{:indent$}{} @{} size={} [{}]\n",
            "",
            header.box_type,
            header.file_position,
            self.render_size(id),
            self.data(id).kind(),
            indent = depth * 2
        ));

        for child in self.children(id) {
            self.dump_node(*child, depth + 1, max_depth, out);
        }
    }
}

impl fmt::Display for Mp4Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_render() {
        let mut tree = Mp4Tree::new();
        let moov = tree
            .append(None, FourCC(*b"moov"), BoxData::Container)
            .unwrap();
        let udta = tree
            .append(Some(moov), FourCC(*b"udta"), BoxData::Container)
            .unwrap();
        tree.append(Some(udta), FourCC(*b"free"), BoxData::Unknown(vec![1, 2, 3]))
            .unwrap();

        assert_eq!(tree.render_size(moov), 8 + 8 + 11);
        let mut out = Vec::new();
        assert_eq!(tree.write_all(&mut out).unwrap(), 27);
        assert_eq!(&out[..8], b"\x00\x00\x00\x1bmoov");
        assert_eq!(&out[16..27], b"\x00\x00\x00\x0bfree\x01\x02\x03");
        assert_eq!(
            tree.find_path(None, "moov/udta/free").map(|x| tree.box_type(x)),
            Some(FourCC(*b"free"))
        );
    }

    #[test]
    fn test_neutralize_keeps_size() {
        let mut tree = Mp4Tree::new();
        let sinf = tree
            .append(None, FourCC(*b"sinf"), BoxData::Container)
            .unwrap();
        tree.append(Some(sinf), FourCC(*b"frma"), BoxData::Unknown(b"mp4a".to_vec()))
            .unwrap();
        let before = tree.render_size(sinf);

        tree.neutralize(sinf).unwrap();
        assert_eq!(tree.render_size(sinf), before);
        assert_eq!(tree.box_type(sinf), FourCC(*b"free"));
        assert!(tree.children(sinf).is_empty());
    }

    #[test]
    fn test_detach() {
        let mut tree = Mp4Tree::new();
        let moov = tree.append(None, FourCC(*b"moov"), BoxData::Container).unwrap();
        let a = tree.append(Some(moov), FourCC(*b"free"), BoxData::Unknown(vec![])).unwrap();
        tree.detach(a);
        assert!(tree.children(moov).is_empty());
        assert_eq!(tree.render_size(moov), 8);
        assert!(tree.find_all(b"free").is_empty());
    }
}

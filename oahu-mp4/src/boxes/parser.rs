use super::{BoxHeader, BoxId, BoxRegistry, Constructor, Mp4Tree};
use crate::{Error, ReadSeek, Reader, Result};

#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Load `mdat` payloads into memory instead of skipping them.
    pub load_media_data: bool,
    /// Deepest nesting accepted before the input is considered malformed.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            load_media_data: false,
            max_depth: 32,
        }
    }
}

/// Recursive box parser building an [`Mp4Tree`] from a seekable stream.
pub struct BoxParser<'a> {
    reader: Reader<'a>,
    registry: &'a BoxRegistry,
    options: ParseOptions,
    tree: Mp4Tree,
    depth: usize,
}

impl<'a> BoxParser<'a> {
    pub fn new(source: &'a mut dyn ReadSeek) -> Result<Self> {
        Self::with_registry(source, BoxRegistry::default_ref(), ParseOptions::default())
    }

    pub fn with_registry(
        source: &'a mut dyn ReadSeek,
        registry: &'a BoxRegistry,
        options: ParseOptions,
    ) -> Result<Self> {
        Ok(Self {
            reader: Reader::new(source)?,
            registry,
            options,
            tree: Mp4Tree::new(),
            depth: 0,
        })
    }

    pub fn reader(&mut self) -> &mut Reader<'a> {
        &mut self.reader
    }

    pub fn tree(&self) -> &Mp4Tree {
        &self.tree
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parses every box from the current position to the end of the stream.
    pub fn parse(mut self) -> Result<Mp4Tree> {
        while self.reader.has_more_data() {
            self.parse_next(None)?;
        }

        Ok(self.tree)
    }

    /// Parses the box at the current position with the registered constructor.
    pub fn parse_next(&mut self, parent: Option<BoxId>) -> Result<BoxId> {
        let header = BoxHeader::read(&mut self.reader)?;
        let parent_type = parent.map(|x| self.tree.box_type(x));
        let constructor = self.registry.lookup(header.box_type, parent_type);
        self.parse_with(parent, header, constructor)
    }

    /// Parses the box at the current position with an explicit constructor.
    ///
    /// Used where the shape of a box depends on its context rather than its
    /// type, such as sample description entries.
    pub fn parse_next_with(
        &mut self,
        parent: Option<BoxId>,
        constructor: Constructor,
    ) -> Result<BoxId> {
        let header = BoxHeader::read(&mut self.reader)?;
        self.parse_with(parent, header, constructor)
    }

    fn parse_with(
        &mut self,
        parent: Option<BoxId>,
        header: BoxHeader,
        constructor: Constructor,
    ) -> Result<BoxId> {
        let box_type = header.box_type;
        let end = header.end();

        if self.depth >= self.options.max_depth {
            return Err(Error::decode(
                header.file_position,
                format!("boxes nested deeper than {} levels", self.options.max_depth),
            )
            .with_box_type(box_type));
        }

        log::trace!(
            "parsing '{}' at {} ({} bytes)",
            box_type,
            header.file_position,
            header.total_box_size
        );

        let id = self.tree.push(header, parent);
        let outer = self.reader.set_limit(end);
        self.depth += 1;
        let data = constructor(self, id);
        self.depth -= 1;
        self.reader.set_limit(outer);
        let data = data.map_err(|e| e.with_box_type(box_type))?;

        let position = self.reader.position();
        if position != end {
            return Err(Error::decode(
                position,
                format!("{} unconsumed bytes at the end of the box", end - position),
            )
            .with_box_type(box_type));
        }

        self.tree.node_mut(id).data = data;
        Ok(id)
    }

    /// Parses children of `id` until its declared size is exhausted.
    pub fn read_children(&mut self, id: BoxId) -> Result<()> {
        while self.reader.has_more_data() {
            self.parse_next(Some(id))?;
        }

        Ok(())
    }

    pub fn into_tree(self) -> Mp4Tree {
        self.tree
    }
}

/// Parses a complete stream with the default registry.
pub fn parse_tree(source: &mut dyn ReadSeek, options: ParseOptions) -> Result<Mp4Tree> {
    BoxParser::with_registry(source, BoxRegistry::default_ref(), options)?.parse()
}

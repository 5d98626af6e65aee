//! Parse, classify and rewrite one file.
//!
//! [`Sorter`] owns the parsed graph of an input file. Constructing it runs
//! the parser and the classifier; [`Sorter::write_to`] then walks the input
//! blocks in address order, copies the ones without problems, rewrites the
//! subtrees that have one, appends a file history entry and finally patches
//! every link of the output.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::Span;

use crate::{
    Error, Result,
    blocks::{
        CN_TYPE_VLSD, ChannelBlock, ChannelGroupBlock, DataGroupBlock, DataListBlock, FileHistoryBlock,
        HeaderListBlock, IdentificationBlock, MetadataBlock, ZIP_VERSION,
        common::BLOCK_HEADER_SIZE,
    },
    classify::{Classifier, ProblemCounts},
    config::SortConfig,
    format::{FormatSchema, schema_for},
    graph::{BlockGraph, BlockKind, ChannelGroupInfo, NodeId, ProblemKind},
    parser::{ParseStats, Parser},
    provider::DataProvider,
    reader::{ByteRangeReader, FileRangeReader},
    splitmerge::{Emitter, SplitMerger, relink},
    writer::{FileWriter, MdfWrite, OutputWriter, patch_links},
};

/// Size of the identification block at the start of every file.
const ID_BLOCK_LEN: u64 = 64;

/// Result of a `check` run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub version: u16,
    /// Settings the file was checked against.
    pub config: SortConfig,
    pub blocks: usize,
    pub parse_runs: usize,
    pub problems: ProblemCounts,
    pub needs_processing: bool,
}

/// Result of a `process` run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub bytes_written: u64,
    pub blocks_written: usize,
    pub links_patched: usize,
    pub problems: ProblemCounts,
}

pub struct Sorter<R> {
    reader: R,
    id: IdentificationBlock,
    schema: Box<dyn FormatSchema>,
    graph: BlockGraph,
    config: SortConfig,
    stats: ParseStats,
    problems: ProblemCounts,
    span: Span,
}

impl Sorter<FileRangeReader> {
    pub fn open(path: impl AsRef<Path>, config: SortConfig) -> Result<Self> {
        Self::from_reader(FileRangeReader::new(path)?, config)
    }
}

impl<R: ByteRangeReader> Sorter<R> {
    /// Validate the identification block, parse and classify the input.
    pub fn from_reader(mut reader: R, config: SortConfig) -> Result<Self> {
        let config = config.normalized();
        let id = IdentificationBlock::from_bytes(&reader.read_range(0, ID_BLOCK_LEN)?)?;
        if id.is_mdf3() && config.is_zip() {
            return Err(Error::ZipNotSupported);
        }

        let span = tracing::info_span!("sort", version = id.version_number);
        let schema = schema_for(&id);
        let (mut graph, stats) = Parser::new(&mut reader, schema.as_ref(), &span).parse()?;
        let problems = Classifier::new(schema.as_ref(), &config, &span).classify(&mut graph)?;

        Ok(Self {
            reader,
            id,
            schema,
            graph,
            config,
            stats,
            problems,
            span,
        })
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn identification(&self) -> &IdentificationBlock {
        &self.id
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    pub fn parse_stats(&self) -> ParseStats {
        self.stats
    }

    pub fn problems(&self) -> ProblemCounts {
        self.problems
    }

    /// Whether the input violates the sorted, uncompressed subset.
    pub fn needs_processing(&self) -> bool {
        self.problems.any()
    }

    pub fn check_report(&self) -> CheckReport {
        CheckReport {
            version: self.schema.version(),
            config: self.config.clone(),
            blocks: self.stats.blocks,
            parse_runs: self.stats.runs,
            problems: self.problems,
            needs_processing: self.needs_processing(),
        }
    }

    /// Write the rewritten file to `writer` and hand the sink back.
    pub fn write_to<W: MdfWrite + Send + 'static>(self, writer: W) -> Result<(W, ProcessSummary)> {
        let Sorter {
            mut reader,
            mut id,
            schema,
            mut graph,
            config,
            problems,
            span,
            ..
        } = self;

        if config.is_zip() && id.version_number < ZIP_VERSION {
            tracing::info!(parent: &span, from = id.version_number, "Raising file version to 4.10");
            id.upgrade_for_zip();
        }

        let out = OutputWriter::new(writer, schema.alignment(), &span)?;
        let mut rewriter = Rewriter {
            reader: &mut reader,
            graph: &mut graph,
            out,
            schema: schema.as_ref(),
            config: &config,
            span: span.clone(),
        };
        rewriter.out.put(&id.to_bytes())?;
        rewriter.run()?;
        let (mut writer, written, bytes_written) = rewriter.out.finish()?;

        let links_patched = patch_links(&mut writer, &graph, &written, schema.as_ref(), &span)?;
        tracing::info!(parent: &span, bytes_written, blocks = written.len(), "Output written");

        Ok((
            writer,
            ProcessSummary {
                bytes_written,
                blocks_written: written.len(),
                links_patched,
                problems,
            },
        ))
    }
}

/// One pass over the input, writing the output.
struct Rewriter<'a, R, W> {
    reader: &'a mut R,
    graph: &'a mut BlockGraph,
    out: OutputWriter<W>,
    schema: &'a dyn FormatSchema,
    config: &'a SortConfig,
    span: Span,
}

/// Records of one channel group found in an unsorted data section.
struct GroupRecords {
    cg: NodeId,
    info: ChannelGroupInfo,
    /// Section offset and total size (record id included) of each record.
    records: Vec<(u64, u64)>,
}

impl<R: ByteRangeReader, W: MdfWrite + Send + 'static> Rewriter<'_, R, W> {
    fn run(&mut self) -> Result<()> {
        let channel_groups = self
            .graph
            .ids()
            .filter(|id| matches!(self.graph.node(*id).kind, BlockKind::ChannelGroup(_)))
            .count();
        let channel_groups = u16::try_from(channel_groups).unwrap_or(u16::MAX);

        for id in self.graph.input_order() {
            let node = self.graph.node(id);
            if !node.problems.is_empty() {
                self.solve(id)?;
            } else if node.touched {
                continue;
            } else if node.kind == BlockKind::Header {
                self.write_header_block(id, channel_groups)?;
            } else {
                self.out.copy_node(self.graph, id, &mut *self.reader)?;
            }
        }

        if !self.schema.is_mdf3() {
            self.append_file_history()?;
        }
        Ok(())
    }

    fn write_header_block(&mut self, id: NodeId, channel_groups: u16) -> Result<()> {
        let mut image = self.graph.node(id).image.clone();
        if self.schema.rewrite_header(&mut image, channel_groups)? {
            self.graph.node_mut(id).image = image;
            self.out.write_node(self.graph, id)
        } else {
            self.out.copy_node(self.graph, id, &mut *self.reader)
        }
    }

    fn solve(&mut self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id);
        if node.problems.len() > 1 {
            return Err(Error::MultipleProblems {
                address: node.address,
                count: node.problems.len(),
            });
        }
        let problem = node.problems[0];
        let parent = problem.parent.ok_or_else(|| {
            Error::BlockLinkError(format!(
                "{} block at {:#x} is not linked from any block",
                node.tag, node.address
            ))
        })?;
        tracing::debug!(
            parent: &self.span,
            kind = ?problem.kind,
            tag = %node.tag,
            address = node.address,
            "Solving problem"
        );

        match problem.kind {
            ProblemKind::UnsortedData => self.sort_data_group(problem.start, parent),
            ProblemKind::LinkedDataList | ProblemKind::ZippedData | ProblemKind::UnzippedData => {
                self.rechunk(problem.start, parent, problem.kind)
            }
        }
    }

    /// Write the section starting at `start` as new blocks under `parent`.
    fn rechunk(&mut self, start: NodeId, parent: NodeId, kind: ProblemKind) -> Result<()> {
        let head = match self.graph.node(start).kind {
            BlockKind::HeaderList => self.graph.link(start, HeaderListBlock::LINK_FIRST_DL),
            _ => Some(start),
        };
        let Some(head) = head else {
            return relink(self.graph, self.schema, parent, Some(start), None);
        };

        let leaves: Vec<NodeId> = match self.graph.node(head).kind {
            BlockKind::DataList(_) => self
                .graph
                .chain(Some(head), DataListBlock::LINK_NEXT)
                .into_iter()
                .flat_map(|list| self.graph.node(list).links.iter().skip(1).flatten().copied().collect::<Vec<_>>())
                .collect(),
            _ => vec![head],
        };
        let Some(&first) = leaves.first() else {
            return relink(self.graph, self.schema, parent, Some(start), None);
        };

        let tag = self.graph.node(first).content_tag();
        let max = self.section_limit(parent);
        let total = DataProvider::new(self.graph, Some(start))?.len();

        let mut merger = SplitMerger::new(
            &tag,
            parent,
            total,
            max,
            self.config.is_zip(),
            self.schema,
            &self.span,
        );
        let mut sink = Emitter {
            graph: &mut *self.graph,
            out: &mut self.out,
            schema: self.schema,
        };
        if kind == ProblemKind::LinkedDataList {
            for leaf in leaves {
                merger.append_block(&mut sink, &mut *self.reader, leaf)?;
            }
        } else {
            merger.append_block(&mut sink, &mut *self.reader, start)?;
        }
        merger.set_links(&mut sink, Some(start))?;
        Ok(())
    }

    /// Block size limit for a section below `parent`, aligned to whole
    /// records when the parent is a data group.
    fn section_limit(&self, parent: NodeId) -> u64 {
        let max = self.config.max_block_size;
        let BlockKind::DataGroup(dg) = self.graph.node(parent).kind else {
            return max;
        };
        let cg = self.graph.link(parent, DataGroupBlock::LINK_FIRST_CG);
        match cg.map(|cg| &self.graph.node(cg).kind) {
            Some(BlockKind::ChannelGroup(info)) => {
                let record_len = u64::from(info.data_bytes)
                    + u64::from(dg.record_id_size)
                    + u64::from(info.inval_bytes);
                self.schema.record_block_limit(record_len, max)
            }
            _ => max,
        }
    }

    /// Split the records of a data group with several channel groups into
    /// one new data group per channel group.
    fn sort_data_group(&mut self, dg: NodeId, parent: NodeId) -> Result<()> {
        let schema = self.schema;
        let BlockKind::DataGroup(info) = self.graph.node(dg).kind else {
            return Err(Error::BlockLinkError("unsorted block is not a data group".to_string()));
        };
        let data_slot = self
            .schema
            .data_link_slot(&self.graph.node(dg).tag)
            .ok_or_else(|| Error::UnsupportedParent(self.graph.node(dg).tag.clone()))?;
        let data = self.graph.link(dg, data_slot);
        let first_cg = self.graph.link(dg, DataGroupBlock::LINK_FIRST_CG);

        let mut groups: Vec<GroupRecords> = Vec::new();
        for cg in self.graph.chain(first_cg, ChannelGroupBlock::LINK_NEXT) {
            if let BlockKind::ChannelGroup(info) = self.graph.node(cg).kind {
                groups.push(GroupRecords {
                    cg,
                    info,
                    records: Vec::new(),
                });
            }
        }

        let mut provider = DataProvider::new(self.graph, data)?;
        self.scan_records(&mut provider, info.record_id_size, info.trailing_record_id, &mut groups)?;

        let id_size = u64::from(info.record_id_size);
        let old_next = self.graph.link(dg, DataGroupBlock::LINK_NEXT);
        let mut last = self.graph.resolve_superseded(parent);

        for index in 0..groups.len() {
            if groups[index].info.vlsd {
                continue;
            }
            let cg = groups[index].cg;
            let new_dg = self.schema.new_data_group();
            let new_dg = self
                .graph
                .add_output_node(new_dg.tag, new_dg.image, new_dg.link_offsets, new_dg.kind);
            self.graph.set_link(last, DataGroupBlock::LINK_NEXT, Some(new_dg));
            self.graph.set_link(new_dg, DataGroupBlock::LINK_FIRST_CG, Some(cg));
            self.graph.set_link(cg, ChannelGroupBlock::LINK_NEXT, None);

            let mut image = std::mem::take(&mut self.graph.node_mut(cg).image);
            self.schema.mark_channel_group_sorted(&mut image)?;
            self.graph.node_mut(cg).image = image;

            self.out.write_node(self.graph, new_dg)?;
            self.out.write_node(self.graph, cg)?;

            let group = &groups[index];
            let record_len = group.info.record_length();
            if group.records.len() as u64 != group.info.cycle_count {
                tracing::warn!(
                    parent: &self.span,
                    record_id = group.info.record_id,
                    cycles = group.info.cycle_count,
                    found = group.records.len(),
                    "Record count differs from the cycle count"
                );
            }
            let total = group.records.len() as u64 * record_len;
            let max = self.schema.record_block_limit(record_len, self.config.max_block_size);
            let ranges: Vec<(u64, u64)> = group
                .records
                .iter()
                .map(|(start, _)| (start + id_size, record_len))
                .collect();
            self.write_section(schema.data_block_tag(), new_dg, total, max, &mut provider, &ranges)?;

            if !self.schema.is_mdf3() {
                self.write_signal_data(cg, &groups, &mut provider, id_size)?;
            }
            last = new_dg;
        }

        self.graph.set_link(last, DataGroupBlock::LINK_NEXT, old_next);
        self.graph.node_mut(dg).superseded_by = Some(last);
        Ok(())
    }

    /// Assign every record of the section to its channel group.
    fn scan_records(
        &mut self,
        provider: &mut DataProvider,
        id_size: u8,
        trailing_id: bool,
        groups: &mut [GroupRecords],
    ) -> Result<()> {
        let by_id: HashMap<u64, usize> = groups
            .iter()
            .enumerate()
            .map(|(index, group)| (group.info.record_id, index))
            .collect();
        let id_len = u64::from(id_size);
        let total = provider.len();
        if total > 0 && id_len == 0 {
            return Err(Error::BlockSerializationError(
                "data group with several channel groups has no record ids".to_string(),
            ));
        }

        let mut offset = 0u64;
        while offset < total {
            let record_id = self
                .schema
                .decode_record_id(&provider.cached_read(&mut *self.reader, offset, id_len)?)?;
            let index = *by_id
                .get(&record_id)
                .ok_or(Error::InvalidRecordId { record_id, offset })?;
            let group = &mut groups[index];

            let size = if group.info.vlsd {
                let prefix = provider.cached_read(&mut *self.reader, offset + id_len, 4)?;
                id_len + 4 + u64::from(u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))
            } else {
                let record_len = group.info.record_length();
                if trailing_id {
                    let trailer = provider.cached_read(&mut *self.reader, offset + id_len + record_len, 1)?;
                    if u64::from(trailer[0]) != record_id {
                        tracing::warn!(
                            parent: &self.span,
                            record_id,
                            trailing = trailer[0],
                            offset,
                            "Trailing record id does not match"
                        );
                    }
                }
                id_len + record_len + u64::from(trailing_id)
            };

            if group.records.len() as u64 >= group.info.cycle_count {
                return Err(Error::BlockSerializationError(format!(
                    "more records with id {} than its {} cycles",
                    record_id, group.info.cycle_count
                )));
            }
            group.records.push((offset, size));
            offset += size;
        }

        if offset != total {
            return Err(Error::DataLengthMismatch {
                expected: total,
                actual: offset,
            });
        }
        Ok(())
    }

    /// Write an `##SD` section for each VLSD channel of `cg` that still
    /// points at a VLSD channel group.
    fn write_signal_data(
        &mut self,
        cg: NodeId,
        groups: &[GroupRecords],
        provider: &mut DataProvider,
        id_size: u64,
    ) -> Result<()> {
        let first_cn = self.graph.link(cg, ChannelGroupBlock::LINK_FIRST_CN);
        for cn in self.graph.chain(first_cn, ChannelBlock::LINK_NEXT) {
            let vlsd = matches!(
                self.graph.node(cn).kind,
                BlockKind::Channel { channel_type } if channel_type == CN_TYPE_VLSD
            );
            if !vlsd {
                continue;
            }
            let Some(target) = self.graph.link(cn, ChannelBlock::LINK_DATA) else {
                continue;
            };
            let Some(group) = groups.iter().find(|g| g.cg == target && g.info.vlsd) else {
                continue;
            };

            let ranges: Vec<(u64, u64)> = group
                .records
                .iter()
                .map(|(start, size)| (start + id_size, size - id_size))
                .collect();
            let total: u64 = ranges.iter().map(|(_, len)| len).sum();
            let expected = group.info.vlsd_length() + 4 * group.records.len() as u64;
            if total != expected {
                tracing::warn!(
                    parent: &self.span,
                    total,
                    expected,
                    "Signal data length differs from its channel group"
                );
            }
            self.write_section("##SD", cn, total, self.config.max_block_size, provider, &ranges)?;
        }
        Ok(())
    }

    fn write_section(
        &mut self,
        tag: &str,
        parent: NodeId,
        total: u64,
        max: u64,
        provider: &mut DataProvider,
        ranges: &[(u64, u64)],
    ) -> Result<()> {
        let mut merger = SplitMerger::new(
            tag,
            parent,
            total,
            max,
            self.config.is_zip(),
            self.schema,
            &self.span,
        );
        let mut sink = Emitter {
            graph: &mut *self.graph,
            out: &mut self.out,
            schema: self.schema,
        };
        for &(offset, length) in ranges {
            merger.append_range(&mut sink, provider, &mut *self.reader, offset, length)?;
        }
        merger.set_links(&mut sink, None)?;
        Ok(())
    }

    /// Add a history entry naming this tool to the end of the FH chain.
    fn append_file_history(&mut self) -> Result<()> {
        let md = MetadataBlock::file_history_comment();
        let md = self
            .graph
            .add_output_node("##MD", md.to_bytes(), Vec::new(), BlockKind::Generic);
        let fh_offsets: Vec<u64> = (0..2).map(|i| (BLOCK_HEADER_SIZE + 8 * i) as u64).collect();
        let fh = self.graph.add_output_node(
            "##FH",
            FileHistoryBlock::now().to_bytes(),
            fh_offsets,
            BlockKind::FileHistory,
        );
        self.graph.set_link(fh, FileHistoryBlock::LINK_COMMENT, Some(md));

        let root = self
            .graph
            .root()
            .ok_or_else(|| Error::BlockLinkError("graph has no header block".to_string()))?;
        let first_fh = self.graph.link(root, 1);
        match self.graph.chain(first_fh, FileHistoryBlock::LINK_NEXT).last() {
            Some(&last) => self.graph.set_link(last, FileHistoryBlock::LINK_NEXT, Some(fh)),
            None => {
                tracing::warn!(parent: &self.span, "Header has no file history, starting one");
                self.graph.set_link(root, 1, Some(fh));
            }
        }

        self.out.write_node(self.graph, fh)?;
        self.out.write_node(self.graph, md)
    }
}

/// Sort `input` into `output`.
pub fn process_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &SortConfig,
) -> Result<ProcessSummary> {
    let sorter = Sorter::open(input, config.clone())?;
    let writer = FileWriter::new(output)?;
    let (_, summary) = sorter.write_to(writer)?;
    Ok(summary)
}

/// Parse and classify `input` without writing anything.
pub fn check_file(input: impl AsRef<Path>, config: &SortConfig) -> Result<CheckReport> {
    Ok(Sorter::open(input, config.clone())?.check_report())
}

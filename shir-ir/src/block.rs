//! Blocks: ordered instruction lists ending in at most one terminator
//!
//! Instructions are kept in an intrusive doubly-linked list of handles. Every
//! list edit keeps the `prev`/`next` links and the owning-block pointer of the
//! affected instructions consistent, and refuses edits that would leave a
//! terminator anywhere but last.

use crate::arena::Handle;
use crate::instruction::Inst;
use crate::module::Module;
use crate::value::Value;

pub type Block = Handle<BlockData>;

#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub(crate) params: Vec<Value>,
    pub(crate) multi_in: bool,
    pub(crate) first: Option<Inst>,
    pub(crate) last: Option<Inst>,
    pub(crate) len: usize,
    pub(crate) parent: Option<Inst>,
}

impl BlockData {
    pub(crate) fn new(multi_in: bool) -> Self {
        Self {
            multi_in,
            ..Self::default()
        }
    }

    /// Block parameters; only multi-in blocks have any
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_multi_in(&self) -> bool {
        self.multi_in
    }

    pub fn first(&self) -> Option<Inst> {
        self.first
    }

    pub fn last(&self) -> Option<Inst> {
        self.last
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The if, loop or switch owning this block. `None` for root and function blocks.
    pub fn parent(&self) -> Option<Inst> {
        self.parent
    }
}

/// Iterator over the instructions of a block, front to back
pub struct BlockIter<'a> {
    module: &'a Module,
    next: Option<Inst>,
}

impl Iterator for BlockIter<'_> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let current = self.next?;
        self.next = self.module.inst(current).next;
        Some(current)
    }
}

impl Module {
    /// Instructions of `block` in order
    pub fn block_insts(&self, block: Block) -> BlockIter<'_> {
        BlockIter {
            module: self,
            next: self.block(block).first,
        }
    }

    /// The last instruction of `block` if it is a terminator
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        let last = self.block(block).last?;
        self.inst(last).kind.is_terminator().then_some(last)
    }

    fn assert_detached(&self, inst: Inst) {
        assert!(
            self.inst(inst).block.is_none(),
            "instruction {:?} is already inserted in a block",
            inst
        );
    }

    fn anchor_block(&self, anchor: Inst) -> Block {
        self.inst(anchor)
            .block
            .unwrap_or_else(|| panic!("anchor instruction {:?} is not inserted in a block", anchor))
    }

    fn link(&mut self, block: Block, inst: Inst, prev: Option<Inst>, next: Option<Inst>) {
        {
            let data = self.inst_mut(inst);
            data.block = Some(block);
            data.prev = prev;
            data.next = next;
        }
        match prev {
            Some(p) => self.inst_mut(p).next = Some(inst),
            None => self.block_mut(block).first = Some(inst),
        }
        match next {
            Some(n) => self.inst_mut(n).prev = Some(inst),
            None => self.block_mut(block).last = Some(inst),
        }
        self.block_mut(block).len += 1;
    }

    pub(crate) fn unlink(&mut self, inst: Inst) -> Block {
        let (block, prev, next) = {
            let data = self.inst(inst);
            let block = data
                .block
                .unwrap_or_else(|| panic!("instruction {:?} is not inserted in a block", inst));
            (block, data.prev, data.next)
        };
        match prev {
            Some(p) => self.inst_mut(p).next = next,
            None => self.block_mut(block).first = next,
        }
        match next {
            Some(n) => self.inst_mut(n).prev = prev,
            None => self.block_mut(block).last = prev,
        }
        let data = self.inst_mut(inst);
        data.block = None;
        data.prev = None;
        data.next = None;
        self.block_mut(block).len -= 1;
        block
    }

    /// Appends `inst` to the end of `block`
    pub fn append(&mut self, block: Block, inst: Inst) {
        self.assert_detached(inst);
        if let Some(term) = self.terminator(block) {
            panic!(
                "cannot append {} to block {:?}: it already ends in {}",
                self.inst(inst).kind.name(),
                block,
                self.inst(term).kind.name()
            );
        }
        let last = self.block(block).last;
        self.link(block, inst, last, None);
    }

    /// Inserts `inst` at the front of `block`
    pub fn prepend(&mut self, block: Block, inst: Inst) {
        self.assert_detached(inst);
        let first = self.block(block).first;
        if first.is_some() && self.inst(inst).kind.is_terminator() {
            panic!("cannot prepend a terminator to non-empty block {:?}", block);
        }
        self.link(block, inst, None, first);
    }

    /// Inserts `inst` immediately before `anchor`
    pub fn insert_before(&mut self, anchor: Inst, inst: Inst) {
        self.assert_detached(inst);
        let block = self.anchor_block(anchor);
        assert!(
            !self.inst(inst).kind.is_terminator(),
            "cannot insert terminator {} before {:?}: a terminator must be last",
            self.inst(inst).kind.name(),
            anchor
        );
        let prev = self.inst(anchor).prev;
        self.link(block, inst, prev, Some(anchor));
    }

    /// Inserts `inst` immediately after `anchor`
    pub fn insert_after(&mut self, anchor: Inst, inst: Inst) {
        self.assert_detached(inst);
        let block = self.anchor_block(anchor);
        assert!(
            !self.inst(anchor).kind.is_terminator(),
            "cannot insert after terminator {:?}",
            anchor
        );
        let next = self.inst(anchor).next;
        if next.is_some() && self.inst(inst).kind.is_terminator() {
            panic!("cannot insert terminator after {:?}: a terminator must be last", anchor);
        }
        self.link(block, inst, Some(anchor), next);
    }

    /// Puts `replacement` where `target` is, leaving `target` detached
    pub fn replace(&mut self, target: Inst, replacement: Inst) {
        self.assert_detached(replacement);
        let block = self.anchor_block(target);
        let (prev, next) = (self.inst(target).prev, self.inst(target).next);
        if next.is_some() && self.inst(replacement).kind.is_terminator() {
            panic!("cannot replace {:?} with a terminator: it is not the last instruction", target);
        }
        self.unlink(target);
        self.link(block, replacement, prev, next);
    }

    /// Removes `inst` from its block, leaving it detached but alive
    pub fn remove(&mut self, inst: Inst) {
        self.unlink(inst);
    }
}

#[cfg(test)]
mod tests {
    use crate::instruction::InstKind;
    use crate::module::Module;

    #[test]
    fn test_links_stay_consistent() {
        let mut module = Module::new();
        let block = module.create_block(false);
        let a = module.create_inst(InstKind::Discard, vec![], vec![]);
        let b = module.create_inst(InstKind::Discard, vec![], vec![]);
        let c = module.create_inst(InstKind::Discard, vec![], vec![]);

        module.append(block, b);
        module.prepend(block, a);
        module.insert_after(b, c);
        assert_eq!(module.block_insts(block).collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(module.inst(b).prev(), Some(a));
        assert_eq!(module.inst(b).next(), Some(c));

        module.remove(b);
        assert_eq!(module.inst(b).block(), None);
        assert_eq!(module.inst(a).next(), Some(c));
        assert_eq!(module.inst(c).prev(), Some(a));
        assert_eq!(module.block(block).len(), 2);
    }

    #[test]
    fn test_terminator() {
        let mut module = Module::new();
        let block = module.create_block(false);
        assert_eq!(module.terminator(block), None);

        let discard = module.create_inst(InstKind::Discard, vec![], vec![]);
        module.append(block, discard);
        assert_eq!(module.terminator(block), None);

        let unreachable = module.create_inst(InstKind::Unreachable, vec![], vec![]);
        module.append(block, unreachable);
        assert_eq!(module.terminator(block), Some(unreachable));
    }

    #[test]
    fn test_replace_detaches_target() {
        let mut module = Module::new();
        let block = module.create_block(false);
        let a = module.create_inst(InstKind::Discard, vec![], vec![]);
        let b = module.create_inst(InstKind::Unreachable, vec![], vec![]);
        module.append(block, a);
        module.replace(a, b);
        assert_eq!(module.inst(a).block(), None);
        assert_eq!(module.terminator(block), Some(b));
    }

    #[test]
    #[should_panic(expected = "it already ends in unreachable")]
    fn test_append_after_terminator_panics() {
        let mut module = Module::new();
        let block = module.create_block(false);
        let a = module.create_inst(InstKind::Unreachable, vec![], vec![]);
        let b = module.create_inst(InstKind::Discard, vec![], vec![]);
        module.append(block, a);
        module.append(block, b);
    }

    #[test]
    #[should_panic(expected = "a terminator must be last")]
    fn test_insert_terminator_before_panics() {
        let mut module = Module::new();
        let block = module.create_block(false);
        let a = module.create_inst(InstKind::Discard, vec![], vec![]);
        let b = module.create_inst(InstKind::Unreachable, vec![], vec![]);
        module.append(block, a);
        module.insert_before(a, b);
    }
}

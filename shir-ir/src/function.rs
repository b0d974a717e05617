//! Functions

use crate::arena::Handle;
use crate::attributes::{IoAttributes, PipelineStage};
use crate::block::Block;
use crate::types::TypeId;
use crate::value::Value;

pub type Function = Handle<FunctionData>;

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: String,
    pub return_type: TypeId,
    pub stage: Option<PipelineStage>,
    /// Workgroup size of a compute entry point: constants or override results
    pub workgroup_size: Option<[Value; 3]>,
    pub return_attributes: IoAttributes,
    pub(crate) params: Vec<Value>,
    pub(crate) block: Block,
}

impl FunctionData {
    pub(crate) fn new(name: String, return_type: TypeId, block: Block) -> Self {
        Self {
            name,
            return_type,
            stage: None,
            workgroup_size: None,
            return_attributes: IoAttributes::default(),
            params: Vec::new(),
            block,
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The top-level block of the function body
    pub fn block(&self) -> Block {
        self.block
    }

    pub fn is_entry_point(&self) -> bool {
        self.stage.is_some()
    }
}

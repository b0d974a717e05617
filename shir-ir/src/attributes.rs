//! Shader interface attributes
//!
//! Attributes attached to variables, function parameters, return values and
//! struct members: builtin semantics, locations, interpolation, invariance and
//! resource binding points.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Builtin values exchanged with the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinValue {
    Position,
    VertexIndex,
    InstanceIndex,
    FrontFacing,
    FragDepth,
    SampleIndex,
    SampleMask,
    LocalInvocationId,
    LocalInvocationIndex,
    GlobalInvocationId,
    WorkgroupId,
    NumWorkgroups,
}

impl fmt::Display for BuiltinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuiltinValue::Position => "position",
            BuiltinValue::VertexIndex => "vertex_index",
            BuiltinValue::InstanceIndex => "instance_index",
            BuiltinValue::FrontFacing => "front_facing",
            BuiltinValue::FragDepth => "frag_depth",
            BuiltinValue::SampleIndex => "sample_index",
            BuiltinValue::SampleMask => "sample_mask",
            BuiltinValue::LocalInvocationId => "local_invocation_id",
            BuiltinValue::LocalInvocationIndex => "local_invocation_index",
            BuiltinValue::GlobalInvocationId => "global_invocation_id",
            BuiltinValue::WorkgroupId => "workgroup_id",
            BuiltinValue::NumWorkgroups => "num_workgroups",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationType {
    Perspective,
    Linear,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationSampling {
    Center,
    Centroid,
    Sample,
    First,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interpolation {
    pub ty: InterpolationType,
    pub sampling: Option<InterpolationSampling>,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = match self.ty {
            InterpolationType::Perspective => "perspective",
            InterpolationType::Linear => "linear",
            InterpolationType::Flat => "flat",
        };
        write!(f, "{}", ty)?;
        if let Some(sampling) = self.sampling {
            let sampling = match sampling {
                InterpolationSampling::Center => "center",
                InterpolationSampling::Centroid => "centroid",
                InterpolationSampling::Sample => "sample",
                InterpolationSampling::First => "first",
                InterpolationSampling::Either => "either",
            };
            write!(f, ", {}", sampling)?;
        }
        Ok(())
    }
}

/// Pipeline IO attributes of a parameter, return value, variable or struct member
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IoAttributes {
    pub location: Option<u32>,
    pub builtin: Option<BuiltinValue>,
    pub interpolation: Option<Interpolation>,
    pub invariant: bool,
}

impl IoAttributes {
    pub fn location(location: u32) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    pub fn builtin(builtin: BuiltinValue) -> Self {
        Self {
            builtin: Some(builtin),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.builtin.is_none()
            && self.interpolation.is_none()
            && !self.invariant
    }

    /// Individual attributes in their textual form, e.g. `@location(0)`
    pub fn to_strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(location) = self.location {
            out.push(format!("@location({})", location));
        }
        if let Some(interpolation) = self.interpolation {
            out.push(format!("@interpolate({})", interpolation));
        }
        if let Some(builtin) = self.builtin {
            out.push(format!("@builtin({})", builtin));
        }
        if self.invariant {
            out.push("@invariant".to_string());
        }
        out
    }
}

/// A resource binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

impl BindingPoint {
    pub fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

impl fmt::Display for BindingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@binding_point({}, {})", self.group, self.binding)
    }
}

/// Pipeline stage of an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Compute,
    Fragment,
    Vertex,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Compute => write!(f, "@compute"),
            PipelineStage::Fragment => write!(f, "@fragment"),
            PipelineStage::Vertex => write!(f, "@vertex"),
        }
    }
}

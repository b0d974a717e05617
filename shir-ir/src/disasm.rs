//! Textual disassembly of a module
//!
//! The output is deterministic: named values print as their name (made
//! unique with a `_N` suffix), anonymous values are numbered in the order they
//! are first printed, blocks are `$B1`, `$B2`, ... and control instructions
//! are `if_1`, `loop_1`, `switch_1`. Alongside the text a source map records
//! where each instruction and block was printed, so diagnostics can point into
//! the disassembly.

use crate::block::Block;
use crate::function::Function;
use crate::instruction::{Inst, InstKind};
use crate::module::Module;
use crate::types::Type;
use crate::value::{Value, ValueKind};
use shir_common::{SourceSpan, SourceTracker};
use std::collections::{HashMap, HashSet};

/// File name used in spans that point into a disassembly
pub const DISASSEMBLY_FILE: &str = "<disassembly>";

/// Disassembled text plus its source map
#[derive(Debug, Clone)]
pub struct Disassembly {
    pub text: String,
    inst_spans: HashMap<Inst, SourceSpan>,
    block_spans: HashMap<Block, SourceSpan>,
    function_spans: HashMap<Function, SourceSpan>,
    block_names: HashMap<Block, String>,
}

impl Disassembly {
    /// The `$BN` name a block was printed with
    pub fn block_name(&self, block: Block) -> Option<&str> {
        self.block_names.get(&block).map(String::as_str)
    }

    pub fn inst_span(&self, inst: Inst) -> Option<&SourceSpan> {
        self.inst_spans.get(&inst)
    }

    pub fn block_span(&self, block: Block) -> Option<&SourceSpan> {
        self.block_spans.get(&block)
    }

    pub fn function_span(&self, func: Function) -> Option<&SourceSpan> {
        self.function_spans.get(&func)
    }
}

/// Disassembles `module` to text
pub fn disassemble(module: &Module) -> String {
    disassemble_with_map(module).text
}

/// Disassembles `module`, keeping the instruction and block source map
pub fn disassemble_with_map(module: &Module) -> Disassembly {
    let mut dis = Disassembler::new(module);
    dis.run();
    Disassembly {
        text: dis.out,
        inst_spans: dis.inst_spans,
        block_spans: dis.block_spans,
        function_spans: dis.function_spans,
        block_names: dis
            .block_ids
            .into_iter()
            .map(|(block, id)| (block, format!("$B{}", id)))
            .collect(),
    }
}

struct Disassembler<'a> {
    module: &'a Module,
    out: String,
    tracker: SourceTracker,
    indent: usize,
    value_names: HashMap<Value, String>,
    function_names: HashMap<Function, String>,
    used_names: HashSet<String>,
    next_value_id: usize,
    block_ids: HashMap<Block, usize>,
    control_ids: HashMap<Inst, String>,
    if_count: usize,
    loop_count: usize,
    switch_count: usize,
    inst_spans: HashMap<Inst, SourceSpan>,
    block_spans: HashMap<Block, SourceSpan>,
    function_spans: HashMap<Function, SourceSpan>,
}

impl<'a> Disassembler<'a> {
    fn new(module: &'a Module) -> Self {
        Self {
            module,
            out: String::new(),
            tracker: SourceTracker::new(DISASSEMBLY_FILE),
            indent: 0,
            value_names: HashMap::new(),
            function_names: HashMap::new(),
            used_names: HashSet::new(),
            next_value_id: 1,
            block_ids: HashMap::new(),
            control_ids: HashMap::new(),
            if_count: 0,
            loop_count: 0,
            switch_count: 0,
            inst_spans: HashMap::new(),
            block_spans: HashMap::new(),
            function_spans: HashMap::new(),
        }
    }

    // ===== Output =====

    fn write(&mut self, text: &str) {
        self.out.push_str(text);
        self.tracker.advance_str(text);
    }

    fn begin_line(&mut self) {
        let indent = "  ".repeat(self.indent);
        self.write(&indent);
    }

    fn end_line(&mut self) {
        self.write("\n");
    }

    // ===== Naming =====

    fn unique_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 1;
        while self.used_names.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.used_names.insert(name.clone());
        name
    }

    fn anonymous_name(&mut self) -> String {
        loop {
            let name = self.next_value_id.to_string();
            self.next_value_id += 1;
            if self.used_names.insert(name.clone()) {
                return name;
            }
        }
    }

    fn function_name(&mut self, func: Function) -> String {
        if !self.module.is_function_alive(func) {
            return "%<destroyed>".to_string();
        }
        if let Some(name) = self.function_names.get(&func) {
            return format!("%{}", name);
        }
        let base = self.module.function(func).name.clone();
        let name = self.unique_name(&base);
        self.function_names.insert(func, name.clone());
        format!("%{}", name)
    }

    fn value_name(&mut self, value: Value) -> String {
        if !self.module.is_value_alive(value) {
            return "%<destroyed>".to_string();
        }
        if let ValueKind::Constant(c) = self.module.value(value).kind {
            return self.module.constants.display(&self.module.types, c);
        }
        if let Some(name) = self.value_names.get(&value) {
            return format!("%{}", name);
        }
        let name = match self.module.name_of(value) {
            Some(base) => {
                let base = base.to_string();
                self.unique_name(&base)
            }
            None => self.anonymous_name(),
        };
        self.value_names.insert(value, name.clone());
        format!("%{}", name)
    }

    fn typed_value(&mut self, value: Value) -> String {
        let name = self.value_name(value);
        if !self.module.is_value_alive(value) {
            return name;
        }
        format!("{}:{}", name, self.module.types.name(self.module.ty(value)))
    }

    fn block_name(&mut self, block: Block) -> String {
        let next = self.block_ids.len() + 1;
        let id = *self.block_ids.entry(block).or_insert(next);
        format!("$B{}", id)
    }

    fn control_name(&mut self, inst: Inst) -> String {
        if let Some(name) = self.control_ids.get(&inst) {
            return name.clone();
        }
        if !self.module.is_inst_alive(inst) {
            return "<destroyed>".to_string();
        }
        let name = match self.module.inst(inst).kind {
            InstKind::If { .. } => {
                self.if_count += 1;
                format!("if_{}", self.if_count)
            }
            InstKind::Loop { .. } => {
                self.loop_count += 1;
                format!("loop_{}", self.loop_count)
            }
            InstKind::Switch { .. } => {
                self.switch_count += 1;
                format!("switch_{}", self.switch_count)
            }
            ref other => format!("<{}>", other.name()),
        };
        self.control_ids.insert(inst, name.clone());
        name
    }

    fn value_list(&mut self, values: &[Value]) -> String {
        let names: Vec<String> = values.iter().map(|v| self.value_name(*v)).collect();
        names.join(", ")
    }

    // ===== Module structure =====

    fn run(&mut self) {
        let module = self.module;
        // Functions are named up front so calls print the same name as the definition.
        for &func in module.functions() {
            self.function_name(func);
        }

        self.emit_structs();

        let root = module.root();
        if !module.block(root).is_empty() {
            self.emit_block(root, Some("root"));
            self.end_line();
        }

        for &func in module.functions() {
            self.emit_function(func);
            self.end_line();
        }
    }

    fn emit_structs(&mut self) {
        let module = self.module;
        for (_, ty) in module.types.iter() {
            let Type::Struct { name, members, align, .. } = ty else {
                continue;
            };
            self.write(&format!("{} = struct @align({}) {{", name, align));
            self.end_line();
            for member in members {
                let mut line = format!(
                    "  {}:{} @offset({})",
                    member.name,
                    module.types.name(member.ty),
                    member.offset
                );
                for attr in member.attributes.to_strings() {
                    line.push(' ');
                    line.push_str(&attr);
                }
                self.write(&line);
                self.end_line();
            }
            self.write("}");
            self.end_line();
            self.end_line();
        }
    }

    fn emit_function(&mut self, func: Function) {
        let module = self.module;
        let data = module.function(func);
        let start = self.tracker.location();

        let mut header = format!("{} = ", self.function_name(func));
        if let Some(stage) = data.stage {
            header.push_str(&format!("{} ", stage));
        }
        if let Some(size) = data.workgroup_size {
            let size = self.value_list(&size);
            header.push_str(&format!("@workgroup_size({}) ", size));
        }
        let params: Vec<String> = data
            .params()
            .iter()
            .map(|p| {
                let mut text = self.typed_value(*p);
                if let ValueKind::FunctionParam { attributes, binding, .. } = &module.value(*p).kind {
                    for attr in attributes.to_strings() {
                        text.push(' ');
                        text.push_str(&attr);
                    }
                    if let Some(binding) = binding {
                        text.push_str(&format!(" {}", binding));
                    }
                }
                text
            })
            .collect();
        header.push_str(&format!("func({}):{}", params.join(", "), module.types.name(data.return_type)));
        for attr in data.return_attributes.to_strings() {
            header.push(' ');
            header.push_str(&attr);
        }
        header.push_str(" {");
        self.write(&header);
        self.function_spans.insert(func, self.tracker.span_from(start));
        self.end_line();

        self.indent += 1;
        self.emit_block(data.block(), None);
        self.indent -= 1;
        self.write("}");
        self.end_line();
    }

    fn emit_block(&mut self, block: Block, comment: Option<&str>) {
        let module = self.module;
        self.begin_line();
        let start = self.tracker.location();
        let mut header = self.block_name(block);
        let params = module.block(block).params();
        if !params.is_empty() {
            let params: Vec<String> = params.iter().map(|p| self.typed_value(*p)).collect();
            header.push_str(&format!(" ({})", params.join(", ")));
        }
        header.push_str(": {");
        self.write(&header);
        self.block_spans.insert(block, self.tracker.span_from(start));
        if let Some(comment) = comment {
            self.write(&format!("  # {}", comment));
        }
        self.end_line();

        self.indent += 1;
        for inst in module.block_insts(block) {
            self.emit_inst(inst);
        }
        self.indent -= 1;

        self.begin_line();
        self.write("}");
        self.end_line();
    }

    // ===== Instructions =====

    fn emit_inst(&mut self, inst: Inst) {
        let module = self.module;
        let data = module.inst(inst);
        self.begin_line();
        let start = self.tracker.location();

        let mut text = String::new();
        if !data.results().is_empty() {
            let results: Vec<String> = data.results().iter().map(|r| self.typed_value(*r)).collect();
            text.push_str(&results.join(", "));
            text.push_str(" = ");
        }
        let operands = data.operands();
        let body = match &data.kind {
            InstKind::Unary(op) => self.with_operands(&op.to_string(), operands),
            InstKind::Binary(op) => self.with_operands(&op.to_string(), operands),
            InstKind::Swizzle { indices } => {
                let components: String = indices
                    .iter()
                    .map(|i| ['x', 'y', 'z', 'w'].get(*i as usize).copied().unwrap_or('?'))
                    .collect();
                format!("{}, {}", self.with_operands("swizzle", operands), components)
            }
            InstKind::Var { binding, attributes } => {
                let mut text = self.with_operands("var", operands);
                if let Some(binding) = binding {
                    text.push_str(&format!(" {}", binding));
                }
                for attr in attributes.to_strings() {
                    text.push(' ');
                    text.push_str(&attr);
                }
                text
            }
            InstKind::Override { id } => {
                let mut text = self.with_operands("override", operands);
                if let Some(id) = id {
                    text.push_str(&format!(" @id({})", id));
                }
                text
            }
            InstKind::UserCall { target } => {
                let mut parts = vec![self.function_name(*target)];
                parts.extend(operands.iter().map(|v| self.value_name(*v)));
                format!("call {}", parts.join(", "))
            }
            InstKind::BuiltinCall(builtin) => self.with_operands(builtin.name(), operands),
            InstKind::Return { .. } => self.with_operands("ret", operands),
            InstKind::If { true_block, false_block } => {
                let (t, f) = (self.block_name(*true_block), self.block_name(*false_block));
                format!("{} [t: {}, f: {}]", self.with_operands("if", operands), t, f)
            }
            InstKind::Loop { initializer, body, continuing } => {
                let mut parts = Vec::new();
                if let Some(init) = initializer {
                    parts.push(format!("i: {}", self.block_name(*init)));
                }
                parts.push(format!("b: {}", self.block_name(*body)));
                parts.push(format!("c: {}", self.block_name(*continuing)));
                format!("loop [{}]", parts.join(", "))
            }
            InstKind::Switch { cases } => {
                let mut parts = Vec::new();
                for case in cases {
                    let selectors: Vec<String> = case
                        .selectors
                        .iter()
                        .map(|s| match s {
                            Some(c) => module.constants.display(&module.types, *c),
                            None => "default".to_string(),
                        })
                        .collect();
                    parts.push(format!("c: ({}, {})", selectors.join(" "), self.block_name(case.block)));
                }
                format!("{} [{}]", self.with_operands("switch", operands), parts.join(", "))
            }
            InstKind::BreakIf { target, next_iter_count } => {
                let split = (1 + *next_iter_count as usize).min(operands.len());
                let mut text = self.with_operands("break_if", &operands[..operands.len().min(1)]);
                if split > 1 {
                    text.push_str(&format!(" next_iteration: [{}]", self.value_list(&operands[1..split])));
                }
                if operands.len() > split {
                    text.push_str(&format!(" exit_loop: [{}]", self.value_list(&operands[split..])));
                }
                format!("{}  # {}", text, self.control_name(*target))
            }
            kind => {
                let text = self.with_operands(kind.name(), operands);
                match kind.exit_target() {
                    Some(target) => format!("{}  # {}", text, self.control_name(target)),
                    None => text,
                }
            }
        };
        text.push_str(&body);

        if data.kind.is_control() {
            text.push_str(" {");
            self.write(&text);
            self.inst_spans.insert(inst, self.tracker.span_from(start));
            let name = self.control_name(inst);
            self.write(&format!("  # {}", name));
            self.end_line();
            self.emit_nested(inst);
            self.begin_line();
            self.write("}");
            self.end_line();
        } else {
            self.write(&text);
            self.inst_spans.insert(inst, self.tracker.span_from(start));
            self.end_line();
        }
    }

    fn with_operands(&mut self, name: &str, operands: &[Value]) -> String {
        if operands.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, self.value_list(operands))
        }
    }

    fn emit_nested(&mut self, inst: Inst) {
        let module = self.module;
        self.indent += 1;
        match &module.inst(inst).kind {
            InstKind::If { true_block, false_block } => {
                self.emit_block(*true_block, Some("true"));
                self.emit_block(*false_block, Some("false"));
            }
            InstKind::Loop { initializer, body, continuing } => {
                if let Some(init) = initializer {
                    self.emit_block(*init, Some("initializer"));
                }
                self.emit_block(*body, Some("body"));
                self.emit_block(*continuing, Some("continuing"));
            }
            InstKind::Switch { cases } => {
                for case in cases {
                    self.emit_block(case.block, Some("case"));
                }
            }
            _ => {}
        }
        self.indent -= 1;
    }
}

//! Shader IR Driver
//!
//! Command-line front for binary shader IR modules: disassembly, validation,
//! loop and workgroup reflection, and a dump of the encoded records.

use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use shir_common::Failure;
use shir_ir::analysis::{workgroup_info, LoopAnalysis};
use shir_ir::codec;
use shir_ir::{
    disassemble, disassemble_with_map, validate_with, AddressSpace, Builder, Capabilities, Function, Module,
    TypeId, Value,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shir")]
#[command(about = "Shader IR tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the disassembly of an encoded module
    Dis {
        /// Encoded module
        input: PathBuf,
    },

    /// Validate an encoded module
    Validate {
        /// Encoded module
        input: PathBuf,

        /// JSON file with the capabilities to validate with
        #[arg(long)]
        capabilities: Option<PathBuf>,
    },

    /// Report which loops are provably finite
    Loops {
        /// Encoded module
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dump the records of an encoded module
    Dump {
        /// Encoded module
        input: PathBuf,

        /// Print the records as JSON instead of debug output
        #[arg(long)]
        json: bool,
    },

    /// Print the workgroup size and storage of a compute entry point
    Workgroup {
        /// Encoded module
        input: PathBuf,

        /// Entry point to reflect
        #[arg(short, long)]
        function: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write one of the built-in sample modules
    Sample {
        /// Which sample to write
        #[arg(short, long, default_value = "counted-loop")]
        name: String,

        /// Output file for the encoded module
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dis { input } => dis_command(&input),
        Commands::Validate { input, capabilities } => validate_command(&input, capabilities.as_deref()),
        Commands::Loops { input, json } => loops_command(&input, json),
        Commands::Dump { input, json } => dump_command(&input, json),
        Commands::Workgroup { input, function, json } => workgroup_command(&input, &function, json),
        Commands::Sample { name, output } => sample_command(&name, &output),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn read_module(path: &Path) -> Result<Module, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let module = codec::decode(&bytes).map_err(Failure::from)?;
    info!("decoded {} ({} bytes)", path.display(), bytes.len());
    Ok(module)
}

fn find_function(module: &Module, name: &str) -> Result<Function, Box<dyn std::error::Error>> {
    module
        .functions()
        .iter()
        .copied()
        .find(|f| module.function(*f).name == name)
        .ok_or_else(|| format!("no function named '{}'", name).into())
}

fn dis_command(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let module = read_module(input)?;
    print!("{}", disassemble(&module));
    Ok(())
}

fn validate_command(input: &Path, capabilities: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let capabilities = match capabilities {
        Some(path) => serde_json::from_str::<Capabilities>(&fs::read_to_string(path)?)?,
        None => Capabilities::default(),
    };
    let module = read_module(input)?;
    validate_with(&module, &capabilities)?;
    println!("{}: valid", input.display());
    Ok(())
}

#[derive(Serialize)]
struct LoopReport {
    function: String,
    line: Option<u32>,
    finite: bool,
    index_var: Option<String>,
}

fn loops_command(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let module = read_module(input)?;
    let dis = disassemble_with_map(&module);

    let mut reports = Vec::new();
    for &func in module.functions() {
        let analysis = LoopAnalysis::new(&module, func);
        for (loop_inst, info) in analysis.iter() {
            let index_var = info.index_var.map(|var| {
                let ptr = module.result(var);
                module.name_of(ptr).map_or_else(|| format!("{:?}", var), str::to_string)
            });
            reports.push(LoopReport {
                function: module.function(func).name.clone(),
                line: dis.inst_span(loop_inst).map(|span| span.start.line),
                finite: info.is_finite(),
                index_var,
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        let line = report.line.map_or_else(|| "?".to_string(), |l| l.to_string());
        match &report.index_var {
            Some(var) => println!("{}:{}: finite (index variable {})", report.function, line, var),
            None => println!("{}:{}: not proven finite", report.function, line),
        }
    }
    Ok(())
}

fn dump_command(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let module = read_module(input)?;
    if json {
        println!("{}", codec::to_json(&module)?);
    } else {
        println!("{:#?}", codec::record(&module)?);
    }
    Ok(())
}

fn workgroup_command(input: &Path, function: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let module = read_module(input)?;
    let func = find_function(&module, function)?;
    let info = workgroup_info(&module, func)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("workgroup size: {}x{}x{}", info.x, info.y, info.z);
        println!("workgroup storage: {} bytes", info.storage_size);
    }
    Ok(())
}

fn sample_command(name: &str, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let module = match name {
        "counted-loop" => counted_loop_sample(),
        "workgroup" => workgroup_sample(),
        _ => return Err(format!("Unknown sample: {} (expected counted-loop or workgroup)", name).into()),
    };
    validate_with(&module, &Capabilities::default())?;
    let bytes = codec::encode(&module)?;
    fs::write(output, &bytes)?;
    println!("Sample '{}' written to: {}", name, output.display());
    Ok(())
}

const NO_ARGS: [Value; 0] = [];

/// `for (var i = 0u; i < 16u; i++) {}` in a compute entry point
fn counted_loop_sample() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let func = b.compute_function("main", 64, 1, 1);
    let body = b.function_block(func);
    b.append(body, |b| {
        let lp = b.loop_();
        let init = b.module_mut().ensure_initializer(lp);
        let idx = b.append(init, |b| {
            let idx = b.function_var("i", TypeId::U32);
            b.store(idx, 0u32);
            b.next_iteration(lp, NO_ARGS);
            idx
        });

        let lp_body = b.module().loop_body(lp);
        b.append(lp_body, |b| {
            let current = b.load(idx);
            let cond = b.less_than(TypeId::BOOL, current, 16u32);
            let guard = b.if_(cond);
            let stay = b.module().true_block(guard);
            let leave = b.module().false_block(guard);
            b.append(stay, |b| b.exit_if(guard, NO_ARGS));
            b.append(leave, |b| b.exit_loop(lp, NO_ARGS));
            b.continue_(lp, NO_ARGS);
        });

        let continuing = b.module().loop_continuing(lp);
        b.append(continuing, |b| {
            let current = b.load(idx);
            let next = b.add(TypeId::U32, current, 1u32);
            b.store(idx, next);
            b.next_iteration(lp, NO_ARGS);
        });
        b.return_(func);
    });
    module
}

/// A compute entry point sized by an override, sharing a workgroup array
fn workgroup_sample() -> Module {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let root = b.module().root();
    let (width, tile) = b.append(root, |b| {
        let width = b.override_init(TypeId::U32, 8u32);
        b.name(width, "width");
        let array = b.types().array(TypeId::F32, 64);
        let ptr = b.types().ptr(AddressSpace::Workgroup, array, shir_ir::Access::ReadWrite);
        let tile = b.var(ptr);
        b.name(tile, "tile");
        (width, tile)
    });

    let func = b.compute_function("main", 1, 1, 1);
    let width = b.value(width);
    let one = b.constant(1u32);
    b.module_mut().function_mut(func).workgroup_size = Some([width, one, one]);
    let body = b.function_block(func);
    b.append(body, |b| {
        let elem = b.types().ptr(AddressSpace::Workgroup, TypeId::F32, shir_ir::Access::ReadWrite);
        let slot = b.access(elem, tile, [0u32]);
        b.store(slot, 1.0f32);
        b.return_(func);
    });
    module
}

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use lumen_engine::device::{Gpu, GpuInit};
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::shader::{
    BuildReport, HeadlessBackend, ScalarType, ShaderBackend, ShaderConfig, ShaderProgram,
    UniformValue, WgpuBackend,
};

#[derive(Parser)]
#[command(name = "lumen-check")]
#[command(about = "Build a vertex/fragment shader pair and report its diagnostics")]
struct Args {
    /// Vertex stage source (WGSL, or GLSL starting with `#version`)
    vertex: PathBuf,

    /// Fragment stage source
    fragment: PathBuf,

    /// Build on a wgpu device instead of the CPU-only backend
    #[arg(long)]
    gpu: bool,

    /// Ask wgpu for a software adapter (implies --gpu)
    #[arg(long)]
    fallback_adapter: bool,

    /// Exit with a failure code unless the program links
    #[arg(long)]
    strict: bool,

    /// Maximum bytes kept from each compile or link log
    #[arg(long, default_value_t = 1024)]
    log_limit: usize,

    /// Uniform to set after a successful link, e.g. `mix_value=0.2` or `flip=true`
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, UniformValue)>,

    /// env_logger filter; overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,

    /// Disable colored log output
    #[arg(long)]
    no_color: bool,
}

/// Parses `NAME=VALUE`; the value is a bool, then an integer, then a float.
fn parse_assignment(arg: &str) -> Result<(String, UniformValue), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{arg}`"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing uniform name in `{arg}`"));
    }

    let value = value.trim();
    let parsed = match value {
        "true" => UniformValue::Bool(true),
        "false" => UniformValue::Bool(false),
        _ => {
            if let Ok(v) = value.parse::<i32>() {
                UniformValue::Int(v)
            } else if let Ok(v) = value.parse::<f32>() {
                UniformValue::Float(v)
            } else {
                return Err(format!("`{value}` is not a bool, integer or float"));
            }
        }
    };

    Ok((name.to_string(), parsed))
}

/// Widens an integer literal when the uniform it targets is declared `f32`.
fn fit_to_uniform(value: UniformValue, ty: Option<ScalarType>) -> UniformValue {
    match (value, ty) {
        (UniformValue::Int(v), Some(ScalarType::F32)) => UniformValue::Float(v as f32),
        _ => value,
    }
}

fn build<B: ShaderBackend>(backend: &mut B, args: &Args) -> ShaderProgram<B> {
    let config = ShaderConfig {
        info_log_limit: args.log_limit,
    };
    let program = ShaderProgram::from_files(backend, &args.vertex, &args.fragment, &config);

    let Some(handle) = program.handle().filter(|_| program.is_usable()) else {
        return program;
    };

    let values: Vec<(&str, UniformValue)> = args
        .set
        .iter()
        .map(|(name, value)| {
            let ty = backend
                .uniform_location(handle, name)
                .and_then(|loc| backend.uniform_type(handle, loc));
            (name.as_str(), fit_to_uniform(*value, ty))
        })
        .collect();

    {
        let mut active = program.bind(backend);
        for (name, value) in values {
            active.set_uniform(name, value);
        }
    }

    program
}

fn print_report(report: &BuildReport) {
    println!("status: {:?}", report.status());
    for d in report.diagnostics() {
        println!("[{}] {}", d.tag(), d);
    }
}

fn run(args: &Args) -> Result<BuildReport> {
    if args.gpu || args.fallback_adapter {
        let gpu = Gpu::blocking_headless(GpuInit {
            force_fallback_adapter: args.fallback_adapter,
            ..Default::default()
        })?;
        let mut backend = WgpuBackend::new(&gpu);

        let program = build(&mut backend, args);
        if let Some(stride) = program.handle().and_then(|p| backend.vertex_stride(p)) {
            println!("vertex stride: {stride} bytes");
        }

        let report = program.report().clone();
        program.delete(&mut backend);
        return Ok(report);
    }

    let mut backend = HeadlessBackend::new();
    let program = build(&mut backend, args);

    if let Some(handle) = program.handle() {
        if let Some(interface) = backend.linked_interface(handle) {
            for var in interface.uniforms.iter() {
                let value = backend.uniform_value(handle, &var.name);
                println!("uniform {} : {} = {value:?}", var.name, var.ty);
            }
        }
    }

    let report = program.report().clone();
    program.delete(&mut backend);
    Ok(report)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(LoggingConfig {
        env_filter: args.log_filter.clone(),
        write_style: if args.no_color {
            env_logger::WriteStyle::Never
        } else {
            env_logger::WriteStyle::Auto
        },
    });

    log::info!(
        "checking {} + {}",
        args.vertex.display(),
        args.fragment.display()
    );

    let report = run(&args)?;
    print_report(&report);

    if args.strict && !report.is_linked() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

//! Plan an LMX2820 output frequency and dump the register image
//!
//! Output lines are `R<n>\t0x<addr><value>`, highest register first, the
//! format TICS Pro exports and most bring-up scripts load.

use clap::Parser;

use lmx2820::frequency::{self, OutputStage};
use lmx2820::lmx2820::*;
use lmx2820::refin::ReferencePath;

/// Parse a frequency like `2400000000`, `2.4e9`, `2.4G`, `100M` or `10k`
fn parse_hz(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (num, scale) = match s.char_indices().last() {
        Some((i, 'G')) | Some((i, 'g')) => (&s[..i], 1e9),
        Some((i, 'M')) => (&s[..i], 1e6),
        Some((i, 'k')) | Some((i, 'K')) => (&s[..i], 1e3),
        _ => (s, 1.0),
    };
    let f: f64 = num.trim().parse().map_err(|e| format!("invalid frequency '{}': {}", s, e))?;
    let hz = f * scale;
    if !hz.is_finite() || hz < 0.0 {
        return Err(format!("invalid frequency '{}'", s));
    }
    Ok(hz.round() as u64)
}

#[derive(Parser)]
#[command(name = "lmx2820-regs")]
#[command(author, version, about = "LMX2820 frequency planner and register dump", long_about = None)]
struct Cli {
    /// Output frequency (Hz, or with a k/M/G suffix)
    #[arg(value_parser = parse_hz)]
    freq: u64,

    /// OSCin frequency
    #[arg(long, value_parser = parse_hz, default_value = "10M")]
    ref_hz: u64,

    /// Enable the OSCin doubler
    #[arg(long)]
    ref_doubler: bool,

    /// Reference pre-divider, PLL_R_PRE
    #[arg(long, default_value_t = 1)]
    pre_div: u16,

    /// Reference multiplier, MULT
    #[arg(long, default_value_t = 1)]
    mult: u8,

    /// Reference post-divider, PLL_R
    #[arg(long, default_value_t = 1)]
    post_div: u8,

    /// Only print registers that differ from the power-on defaults
    #[arg(long)]
    changed: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let reference = ReferencePath::new(cli.ref_hz, cli.ref_doubler, cli.pre_div, cli.mult, cli.post_div)?;
    let plan = frequency::plan(cli.freq, &reference, &VCO)?;

    let mut image = Lmx2820Image::new();
    encode_reference(&mut image, &reference)?;
    encode_plan(&mut image, &plan)?;
    image.write(FCAL_EN, 1)?;

    let stage = match plan.output {
        OutputStage::Vco => "VCO".to_string(),
        OutputStage::Doubler => "VCO x2".to_string(),
        OutputStage::Divider(k) => format!("VCO / {}", 1u32 << (k + 1)),
    };
    eprintln!("f PFD     {} Hz", plan.f_pfd);
    eprintln!("f VCO     {} Hz (core {}, {:.1} MHz/V)", plan.vco, plan.vco_band, gain(&plan));
    eprintln!("output    {}", stage);
    eprintln!("N         {}", plan.n);
    eprintln!("NUM/DEN   {}/{}", plan.numerator, plan.denominator);
    eprintln!("MASH      {}", plan.modulator_order);
    eprintln!("achieved  {} Hz ({:+e} Hz)", plan.achieved, plan.achieved - cli.freq as f64);

    let defaults = Lmx2820Image::new();
    for addr in (0..image.len() as u8).rev() {
        let w = image.get(addr)?;
        if cli.changed && w == defaults.get(addr)? {
            continue;
        }
        println!("R{}\t0x{:02X}{:04X}", addr, addr, w);
    }
    Ok(())
}

fn gain(plan: &frequency::SynthesizerPlan) -> f64 {
    VCO.bands
        .iter()
        .find(|b| b.index == plan.vco_band)
        .map(|b| b.gain_at(plan.vco))
        .unwrap_or(0.0)
}

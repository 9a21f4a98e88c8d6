//! Command-line front end for the trellis recognizer.
//!
//! Two jobs: inspect a model directory layout (`--probe`), and stream audio
//! through a recognizer session, printing one result object per line. Audio
//! comes from WAV files or, absent `--wav`, raw little-endian 16-bit mono
//! PCM on stdin.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use trellis_core::config::OutputMode;
use trellis_core::model::GraphSpec;
use trellis_core::sim::{SimModelConfig, SimStore};
use trellis_core::{Model, ModelFiles, ModelHandle, RecognizerConfig, RecognizerSession};

#[derive(Debug)]
struct Args {
    probe: Option<PathBuf>,
    model: Option<PathBuf>,
    wavs: Vec<PathBuf>,
    config: Option<PathBuf>,
    script: Vec<String>,
    mode: Option<OutputMode>,
    word_times: bool,
    chunk_ms: usize,
}

const USAGE: &str = "\
Usage:
  trellis --probe <model-dir>
  trellis [--model <model-dir>] [--wav <file.wav>]... [options]

Options:
  --probe <dir>       report the model directory layout and exit
  --model <dir>       load symbols/metadata from a model directory
  --wav <file>        WAV input (repeatable); stdin PCM when omitted
  --config <file>     recognizer config JSON
  --script <words>    words recognized for successive voiced regions
  --mode <m>          best | nbest:<n> | xml:<n>
  --word-times        include per-word timing in results
  --chunk-ms <n>      streaming chunk size (default 200)
  -h, --help          show this help";

fn parse_args() -> Result<Args> {
    let mut args = Args {
        probe: None,
        model: None,
        wavs: Vec::new(),
        config: None,
        script: Vec::new(),
        mode: None,
        word_times: false,
        chunk_ms: 200,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .with_context(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--probe" => args.probe = Some(PathBuf::from(value("--probe")?)),
            "--model" => args.model = Some(PathBuf::from(value("--model")?)),
            "--wav" => args.wavs.push(PathBuf::from(value("--wav")?)),
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--script" => {
                args.script = value("--script")?
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            "--mode" => args.mode = Some(parse_mode(&value("--mode")?)?),
            "--word-times" => args.word_times = true,
            "--chunk-ms" => {
                args.chunk_ms = value("--chunk-ms")?
                    .parse::<usize>()
                    .context("invalid value for --chunk-ms")?
                    .clamp(10, 5_000);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other} (see --help)"),
        }
    }
    Ok(args)
}

fn parse_mode(spec: &str) -> Result<OutputMode> {
    if spec == "best" {
        return Ok(OutputMode::BestPath { word_times: false });
    }
    if let Some(n) = spec.strip_prefix("nbest:") {
        return Ok(OutputMode::Nbest {
            max_alternatives: n.parse().context("invalid --mode nbest:<n>")?,
            word_times: false,
        });
    }
    if let Some(n) = spec.strip_prefix("xml:") {
        return Ok(OutputMode::AlternativesXml {
            max_alternatives: n.parse().context("invalid --mode xml:<n>")?,
        });
    }
    bail!("unknown output mode '{spec}' (best | nbest:<n> | xml:<n>)")
}

fn probe_report(dir: &Path) -> Result<()> {
    let files = ModelFiles::probe(dir)?;
    println!("model root:     {}", files.root.display());
    println!("layout:         {:?}", files.layout);
    match &files.graph {
        GraphSpec::Precomposed { hclg_fst } => {
            println!("graph:          precomposed ({})", hclg_fst.display());
        }
        GraphSpec::Split { hclr_fst, .. } => {
            println!("graph:          split with lookahead ({})", hclr_fst.display());
        }
    }
    println!("word symbols:   {}", files.words_txt.display());
    let flag = |present: bool| if present { "yes" } else { "no" };
    println!("word boundary:  {}", flag(files.word_boundary_int.is_some()));
    println!("ivector:        {}", flag(files.ivector_extractor.is_some()));
    println!("rescore pair:   {}", flag(files.has_rescore_pair()));
    println!("neural lm:      {}", flag(files.neural_lm_dir.is_some()));
    Ok(())
}

fn read_wav_mono_i16(path: &Path) -> Result<(Vec<i16>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("open {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
            reader.samples::<i16>().collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
            .collect::<Result<_, _>>()?,
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mono = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect();
    Ok((mono, spec.sample_rate))
}

fn read_stdin_pcm() -> Result<Vec<i16>> {
    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .context("read PCM from stdin")?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn build_model(args: &Args, sample_rate: u32) -> Result<ModelHandle> {
    if let Some(dir) = &args.model {
        let store = SimStore {
            script: args.script.clone(),
            sample_rate,
            ..SimStore::default()
        };
        return Ok(Model::open(dir, &store)?);
    }
    Ok(SimModelConfig {
        vocab: args.script.clone(),
        script: args.script.clone(),
        sample_rate,
        ..SimModelConfig::default()
    }
    .build())
}

fn stream(session: &mut RecognizerSession, samples: &[i16], chunk_len: usize) -> Result<()> {
    let mut last_partial = String::new();
    for chunk in samples.chunks(chunk_len.max(1)) {
        if session.accept_waveform(chunk)? {
            println!("{}", session.result()?);
            last_partial.clear();
            continue;
        }
        let partial = session.partial_result()?;
        if partial != last_partial {
            println!("{partial}");
            last_partial = partial;
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let args = parse_args()?;

    if let Some(dir) = &args.probe {
        return probe_report(dir);
    }

    let mut config = match &args.config {
        Some(path) => RecognizerConfig::load(path)?,
        None => RecognizerConfig::default(),
    };
    if let Some(mode) = args.mode.clone() {
        config.output = match mode {
            OutputMode::BestPath { .. } => OutputMode::BestPath {
                word_times: args.word_times,
            },
            OutputMode::Nbest {
                max_alternatives, ..
            } => OutputMode::Nbest {
                max_alternatives,
                word_times: args.word_times,
            },
            xml @ OutputMode::AlternativesXml { .. } => xml,
        };
    } else if args.word_times {
        config.output = OutputMode::BestPath { word_times: true };
    }

    // (samples, sample rate, label) per input
    let mut inputs: Vec<(Vec<i16>, u32, String)> = Vec::new();
    if args.wavs.is_empty() {
        inputs.push((read_stdin_pcm()?, config.sample_rate, "<stdin>".into()));
    } else {
        for wav in &args.wavs {
            let (samples, rate) = read_wav_mono_i16(wav)?;
            inputs.push((samples, rate, wav.display().to_string()));
        }
    }

    let sample_rate = inputs[0].1;
    let model = build_model(&args, sample_rate)?;
    info!(
        words = model.symbols().len(),
        rescore = model.rescore_lms().is_some(),
        "model ready"
    );

    for (samples, rate, label) in &inputs {
        let mut config = config.clone();
        config.sample_rate = *rate;
        let chunk_len = *rate as usize * args.chunk_ms / 1000;

        info!(
            input = %label,
            seconds = samples.len() as f64 / f64::from(*rate),
            "transcribing"
        );
        let mut session = RecognizerSession::new(&model, config);
        stream(&mut session, samples, chunk_len)?;
        println!("{}", session.final_result()?);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trellis=info".parse().expect("static filter")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("trellis: {e:#}");
        std::process::exit(1);
    }
}

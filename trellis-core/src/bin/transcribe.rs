fn main() {
    if let Err(e) = run() {
        eprintln!("transcribe failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use std::path::{Path, PathBuf};

    use trellis_core::sim::SimModelConfig;
    use trellis_core::{RecognizerConfig, RecognizerSession};

    #[derive(Debug)]
    struct Args {
        wav: PathBuf,
        config: Option<PathBuf>,
        script: Vec<String>,
        chunk_ms: usize,
    }

    fn parse_args() -> Result<Args, String> {
        let mut wav: Option<PathBuf> = None;
        let mut config: Option<PathBuf> = None;
        let mut script: Vec<String> = Vec::new();
        let mut chunk_ms: usize = 200;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--wav" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --wav".into());
                    };
                    wav = Some(PathBuf::from(v));
                }
                "--config" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --config".into());
                    };
                    config = Some(PathBuf::from(v));
                }
                "--script" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --script".into());
                    };
                    script = v.split_whitespace().map(str::to_string).collect();
                }
                "--chunk-ms" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --chunk-ms".into());
                    };
                    chunk_ms = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --chunk-ms".to_string())?
                        .clamp(10, 5_000);
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p trellis-core --bin transcribe -- \\
  --wav <file.wav> --script \"<words...>\" [--config <file.json>] [--chunk-ms <n>]

Streams a WAV file through a sim-backed recognizer session. Each voiced
region in the audio is recognized as the next word of the script."
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        let Some(wav) = wav else {
            return Err("--wav is required (see --help)".into());
        };
        Ok(Args {
            wav,
            config,
            script,
            chunk_ms,
        })
    }

    fn read_wav_mono_i16(path: &Path) -> Result<(Vec<i16>, u32), String> {
        let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => {
                if spec.bits_per_sample <= 16 {
                    reader
                        .samples::<i16>()
                        .map(|s| s.map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    let shift = spec.bits_per_sample - 16;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| (v >> shift) as i16).map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                }
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| {
                    s.map(|v| (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                        .map_err(|e| e.to_string())
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if channels == 1 {
            return Ok((interleaved, spec.sample_rate));
        }
        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        for frame in interleaved.chunks(channels) {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            mono.push((sum / frame.len() as i32) as i16);
        }
        Ok((mono, spec.sample_rate))
    }

    let args = parse_args()?;
    let (samples, sample_rate) = read_wav_mono_i16(&args.wav)?;

    let mut config = match &args.config {
        Some(path) => RecognizerConfig::load(path).map_err(|e| e.to_string())?,
        None => RecognizerConfig::default(),
    };
    config.sample_rate = sample_rate;

    let model = SimModelConfig {
        vocab: args.script.clone(),
        script: args.script.clone(),
        sample_rate,
        ..SimModelConfig::default()
    }
    .build();

    println!(
        "Streaming {} ({:.1}s @ {sample_rate} Hz) in {} ms chunks",
        args.wav.display(),
        samples.len() as f64 / f64::from(sample_rate),
        args.chunk_ms
    );

    let mut session = RecognizerSession::new(&model, config);
    let chunk_len = (sample_rate as usize * args.chunk_ms / 1000).max(1);
    let mut last_partial = String::new();

    for chunk in samples.chunks(chunk_len) {
        let endpoint = session.accept_waveform(chunk).map_err(|e| e.to_string())?;
        if endpoint {
            let result = session.result().map_err(|e| e.to_string())?;
            println!("{result}");
            last_partial.clear();
            continue;
        }
        let partial = session.partial_result().map_err(|e| e.to_string())?;
        if partial != last_partial {
            println!("{partial}");
            last_partial = partial;
        }
    }

    let final_result = session.final_result().map_err(|e| e.to_string())?;
    println!("{final_result}");
    Ok(())
}

use anyhow::{anyhow, bail, Context, Result};
use image::GrayImage;
use log::debug;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use super::setup::{locate_tesseract, TesseractPaths};
use super::{OcrEngine, OcrOutput, OcrRequest, OcrToken};
use crate::config::OcrConfig;
use crate::geometry::Rect;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the `tesseract` CLI with TSV output.
#[derive(Clone, Debug)]
pub struct TesseractEngine {
    paths: TesseractPaths,
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths, config: &OcrConfig) -> Self {
        Self {
            paths,
            language: config.language.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Locates an installed Tesseract.
    pub fn discover(config: &OcrConfig) -> Result<Self> {
        Ok(Self::new(locate_tesseract(config)?, config))
    }

    pub fn executable(&self) -> &Path {
        &self.paths.executable
    }

    fn args(&self, input: &Path, output_base: &Path, request: &OcrRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![input.into(), output_base.into()];
        if let Some(tessdata) = &self.paths.tessdata {
            args.push("--tessdata-dir".into());
            args.push(tessdata.into());
        }
        args.push("-l".into());
        args.push(self.language.as_str().into());
        args.push("--psm".into());
        // 7 = single text line, 6 = uniform block
        args.push(if request.single_line { "7" } else { "6" }.into());
        if let Some(alphabet) = &request.alphabet {
            args.push("-c".into());
            args.push(format!("tessedit_char_whitelist={}", alphabet).into());
        }
        args.push("tsv".into());
        args
    }

    /// Runs the process, killing it once the timeout expires. Stderr is
    /// drained on a separate thread so a chatty child cannot block.
    fn run(&self, args: &[OsString]) -> Result<()> {
        let mut child = Command::new(&self.paths.executable)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.paths.executable.display()))?;

        let stderr_pipe = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut stderr = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut stderr);
            }
            stderr
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                bail!("Tesseract timed out after {} ms", self.timeout.as_millis());
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = stderr_reader.join().unwrap_or_default();
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }
        Ok(())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage, request: &OcrRequest) -> Result<OcrOutput> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base: PathBuf = temp_output.path().to_path_buf();

        self.run(&self.args(temp_input.path(), &output_base, request))?;

        let mut tsv_path = output_base.into_os_string();
        tsv_path.push(".tsv");
        let tsv_path = PathBuf::from(tsv_path);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        let output = parse_tsv_output(&tsv_content);
        debug!("Tesseract: {:?}", output.text);
        Ok(output)
    }
}

/// Parses Tesseract TSV output into word tokens and line-joined text.
pub fn parse_tsv_output(tsv: &str) -> OcrOutput {
    let mut tokens: Vec<OcrToken> = Vec::new();
    let mut line_ids: HashMap<(u32, u32, u32), u32> = HashMap::new();

    for line in tsv.lines().skip(1) {
        // Skip header
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let num = |i: usize| fields[i].trim().parse::<u32>().ok();
        let level = num(0);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        // Level 5 = word
        if level != Some(5) || text.is_empty() || conf < 0.0 {
            continue;
        }

        let (Some(block), Some(par), Some(line_num)) = (num(2), num(3), num(4)) else {
            continue;
        };
        let (Some(left), Some(top), Some(width), Some(height)) = (num(6), num(7), num(8), num(9))
        else {
            continue;
        };
        let Some(bounds) = Rect::new(left, top, width, height) else {
            continue;
        };

        let next_id = line_ids.len() as u32;
        let line = *line_ids.entry((block, par, line_num)).or_insert(next_id);

        tokens.push(OcrToken {
            text: text.to_string(),
            bounds,
            confidence: conf,
            line,
        });
    }

    let mut text_lines: Vec<Vec<&str>> = vec![Vec::new(); line_ids.len()];
    for token in &tokens {
        text_lines[token.line as usize].push(&token.text);
    }
    let text = text_lines
        .iter()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    OcrOutput {
        text,
        tokens: Some(tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_parse_tsv_words_and_lines() {
        let content = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t400\t120\t-1\t",
            "4\t1\t1\t1\t1\t0\t10\t5\t200\t30\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t5\t90\t30\t91.5\t0.5/2.0学时",
            "5\t1\t1\t1\t1\t2\t120\t5\t60\t30\t88.0\t必修",
            "5\t1\t1\t1\t2\t1\t10\t60\t90\t30\t76.25\t2.0/2.0学时",
        ]);
        let out = parse_tsv_output(&content);
        let tokens = out.tokens.unwrap();

        assert_eq!(out.text, "0.5/2.0学时 必修\n2.0/2.0学时");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].bounds, Rect::new(10, 5, 90, 30).unwrap());
        assert_eq!(tokens[0].confidence, 91.5);
        assert_eq!(tokens[1].line, 0);
        assert_eq!(tokens[2].line, 1);
    }

    #[test]
    fn test_parse_tsv_skips_noise() {
        let content = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t5\t90\t30\t-1\tghost",
            "5\t1\t1\t1\t1\t2\t10\t5\t90\t30\t95\t   ",
            "5\t1\t1\t1\t1\t3\t10\t5\t0\t30\t95\tflat",
            "garbage line",
            "5\t1\t1\t1\t1\t4\t10\t5\t40\t30\t95\tok",
        ]);
        let out = parse_tsv_output(&content);
        assert_eq!(out.text, "ok");
        assert_eq!(out.tokens.unwrap().len(), 1);
    }

    #[test]
    fn test_parse_tsv_empty() {
        let out = parse_tsv_output(HEADER);
        assert_eq!(out.text, "");
        assert_eq!(out.tokens, Some(Vec::new()));
    }

    #[test]
    fn test_args_by_mode() {
        let engine = TesseractEngine::new(
            TesseractPaths {
                executable: PathBuf::from("tesseract"),
                tessdata: Some(PathBuf::from("/data/tessdata")),
            },
            &OcrConfig::default(),
        );
        let single = OcrRequest {
            alphabet: Some("0123456789./学时".to_string()),
            single_line: true,
        };
        let args = engine.args(Path::new("in.png"), Path::new("out"), &single);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "in.png",
                "out",
                "--tessdata-dir",
                "/data/tessdata",
                "-l",
                "chi_sim",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=0123456789./学时",
                "tsv",
            ]
        );

        let block = engine.args(Path::new("in.png"), Path::new("out"), &OcrRequest::default());
        assert!(block.iter().any(|a| a == "6"));
        assert!(!block.iter().any(|a| a == "-c"));
    }

    #[test]
    fn test_missing_executable_is_error() {
        let engine = TesseractEngine::new(
            TesseractPaths {
                executable: PathBuf::from("/nonexistent/menu-scan/tesseract"),
                tessdata: None,
            },
            &OcrConfig::default(),
        );
        let img = GrayImage::new(10, 10);
        assert!(engine.recognize(&img, &OcrRequest::default()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_does_not_stall() {
        let engine = TesseractEngine::new(
            TesseractPaths {
                executable: PathBuf::from("/bin/sh"),
                tessdata: None,
            },
            &OcrConfig {
                timeout_ms: 5000,
                ..OcrConfig::default()
            },
        );
        let args: Vec<OsString> = vec![
            "-c".into(),
            "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 3".into(),
        ];
        let err = engine.run(&args).unwrap_err().to_string();
        assert!(err.starts_with("Tesseract failed"), "{}", err);
        assert!(err.contains("xxxx"));
    }
}

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::core::config::Settings;

/// Encoding parameters shared by every clip of one render.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub width: u32,
    pub height: u32,
    pub zoom_rate: f64,
}

impl From<&Settings> for EncodeSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            fps: settings.video_fps,
            video_codec: settings.video_codec.clone(),
            audio_codec: settings.audio_codec.clone(),
            width: settings.canvas_width,
            height: settings.canvas_height,
            zoom_rate: settings.zoom_rate,
        }
    }
}

/// Runs a media tool to completion and returns its stdout.
pub async fn run_tool(bin: &str, args: &[String]) -> Result<Vec<u8>> {
    debug!("{} {}", bin, args.join(" "));
    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}", bin))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(anyhow!("{} exited with {}: {}", bin, output.status, tail.join(" | ")));
    }
    Ok(output.stdout)
}

pub async fn media_duration(ffprobe_bin: &str, path: &Path) -> Result<f64> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ];
    let stdout = run_tool(ffprobe_bin, &args).await?;
    parse_duration(&String::from_utf8_lossy(&stdout))
        .with_context(|| format!("Unreadable duration for {}", path.display()))
}

pub fn parse_duration(stdout: &str) -> Result<f64> {
    let value = stdout.trim();
    let seconds: f64 = value
        .parse()
        .map_err(|_| anyhow!("Not a duration: '{}'", value))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(anyhow!("Not a duration: '{}'", value));
    }
    Ok(seconds)
}

/// Background colour of placeholder scene `index`.
pub fn scene_color(index: usize) -> (u8, u8, u8) {
    (
        ((index * 50) % 255) as u8,
        ((index * 80) % 255) as u8,
        ((index * 110) % 255) as u8,
    )
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Quotes a value for use inside an ffmpeg filter argument.
fn quote_filter_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Solid-colour still, optionally with text read from `text_file`.
pub fn placeholder_image_args(
    output: &Path,
    color: (u8, u8, u8),
    width: u32,
    height: u32,
    text_file: Option<&Path>,
) -> Vec<String> {
    let (r, g, b) = color;
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("color=c=0x{:02X}{:02X}{:02X}:s={}x{}:d=1", r, g, b, width, height),
    ];
    if let Some(text_file) = text_file {
        args.push("-vf".to_string());
        args.push(format!(
            "drawtext=textfile={}:x=10:y=10:fontsize=32:fontcolor=white",
            quote_filter_value(&text_file.to_string_lossy())
        ));
    }
    args.extend([
        "-frames:v".to_string(),
        "1".to_string(),
        output.to_string_lossy().to_string(),
    ]);
    args
}

/// One scene clip: the still fitted onto the canvas, zoomed by
/// `1 + zoom_rate * t`, with its narration or silence, cut to `duration`.
pub fn clip_args(
    image: &Path,
    audio: Option<&Path>,
    duration: f64,
    encode: &EncodeSettings,
    output: &Path,
) -> Vec<String> {
    let (w, h, fps) = (encode.width, encode.height, encode.fps);
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-loop".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        fps.to_string(),
        "-i".to_string(),
        image.to_string_lossy().to_string(),
    ];
    match audio {
        Some(audio) => {
            args.push("-i".to_string());
            args.push(audio.to_string_lossy().to_string());
        }
        None => {
            args.extend([
                "-f".to_string(),
                "lavfi".to_string(),
                "-i".to_string(),
                "anullsrc=channel_layout=stereo:sample_rate=44100".to_string(),
            ]);
        }
    }

    let filter = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,\
         zoompan=z='1+{rate}*on/{fps}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={w}x{h}:fps={fps},\
         format=yuv420p[v];[1:a]apad[a]",
        w = w,
        h = h,
        fps = fps,
        rate = encode.zoom_rate,
    );

    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
        "-r".to_string(),
        fps.to_string(),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-c:a".to_string(),
        encode.audio_codec.clone(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        output.to_string_lossy().to_string(),
    ]);
    args
}

/// Input list for ffmpeg's concat demuxer. The demuxer resolves entries
/// against the list file's own directory, so only file names are written and
/// the list must sit next to the clips.
pub fn concat_list<P: AsRef<Path>>(clips: &[P]) -> String {
    clips
        .iter()
        .map(|p| {
            let name = p
                .as_ref()
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            format!("file '{}'\n", name.replace('\'', "'\\''"))
        })
        .collect()
}

pub fn concat_args(list_file: &Path, encode: &EncodeSettings, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_file.to_string_lossy().to_string(),
        "-r".to_string(),
        encode.fps.to_string(),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        encode.audio_codec.clone(),
        output.to_string_lossy().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn encode() -> EncodeSettings {
        EncodeSettings::from(&Settings::default())
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3.250000\n").unwrap(), 3.25);
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1").is_err());
    }

    #[test]
    fn test_scene_colors_differ() {
        assert_eq!(scene_color(0), (0, 0, 0));
        assert_eq!(scene_color(1), (50, 80, 110));
        assert_eq!(scene_color(3), (150, 240, 75));
        assert_ne!(scene_color(1), scene_color(2));
    }

    #[test]
    fn test_truncate_chars_is_utf8_safe() {
        assert_eq!(truncate_chars("ñandú feliz", 5), "ñandú");
        assert_eq!(truncate_chars("abc", 50), "abc");
    }

    #[test]
    fn test_placeholder_args() {
        let args = placeholder_image_args(
            Path::new("a/scene_001_Tico.png"),
            (50, 80, 110),
            1280,
            720,
            Some(Path::new("a/it's.txt")),
        );
        assert!(args.contains(&"color=c=0x32506E:s=1280x720:d=1".to_string()));
        assert!(args.iter().any(|a| a.starts_with("drawtext=textfile='a/it'\\''s.txt'")));
        assert_eq!(args.last().map(String::as_str), Some("a/scene_001_Tico.png"));

        let plain = placeholder_image_args(Path::new("x.png"), (0, 0, 0), 1280, 720, None);
        assert!(!plain.iter().any(|a| a.contains("drawtext")));
    }

    #[test]
    fn test_clip_args_with_audio() {
        let args = clip_args(
            Path::new("scene.png"),
            Some(Path::new("voice.mp3")),
            3.5,
            &encode(),
            Path::new("clip_001.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i voice.mp3"));
        assert!(!joined.contains("anullsrc"));
        assert!(joined.contains("zoompan=z='1+0.05*on/24'"));
        assert!(joined.contains("s=1280x720"));
        assert!(joined.contains("-t 3.500"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-c:a aac"));
    }

    #[test]
    fn test_clip_args_without_audio_uses_silence() {
        let args = clip_args(Path::new("scene.png"), None, 5.0, &encode(), Path::new("c.mp4"));
        assert!(args.iter().any(|a| a.starts_with("anullsrc")));
        assert!(args.join(" ").contains("-t 5.000"));
    }

    #[test]
    fn test_concat_list_quotes() {
        let list = concat_list(&[Path::new("/tmp/clip_001.mp4"), Path::new("/tmp/o'clock.mp4")]);
        assert_eq!(list, "file 'clip_001.mp4'\nfile 'o'\\''clock.mp4'\n");
    }

    #[test]
    fn test_concat_entries_resolve_from_list_dir() {
        let work_dir = Path::new("pods/kids_story/output/.Ep_clips");
        let parts = vec![work_dir.join("clip_001.mp4"), work_dir.join("clip_002.mp4")];

        let list = concat_list(&parts);
        let resolved: Vec<PathBuf> = list
            .lines()
            .map(|line| {
                let entry = line.trim_start_matches("file '").trim_end_matches('\'');
                work_dir.join(entry)
            })
            .collect();
        assert_eq!(resolved, parts);
    }
}

use argh::FromArgs;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use klt::image::Image;
use klt::tracking::{KltTracker, TrackingConfig, TrackingContext};

#[derive(FromArgs)]
/// Select, track and replace features over a synthetic translating texture
struct Args {
    /// path to a JSON tracking configuration, missing fields take their default
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of features to follow
    #[argh(option, default = "100")]
    num_features: usize,

    /// number of frames to generate
    #[argh(option, default = "10")]
    num_frames: usize,

    /// frame width in pixels
    #[argh(option, default = "320")]
    width: usize,

    /// frame height in pixels
    #[argh(option, default = "240")]
    height: usize,

    /// horizontal motion per frame in pixels
    #[argh(option, default = "1.5")]
    dx: f32,

    /// vertical motion per frame in pixels
    #[argh(option, default = "-0.5")]
    dy: f32,

    /// standard deviation of the uniform sensor noise, in [0, 1] intensity units
    #[argh(option, default = "0.0")]
    noise: f32,

    /// seed of the noise generator
    #[argh(option, default = "42")]
    seed: u64,

    /// write the final feature records to this JSON file
    #[argh(option)]
    output: Option<PathBuf>,
}

fn render_frame(
    width: usize,
    height: usize,
    shift: (f32, f32),
    noise: f32,
    rng: &mut impl Rng,
) -> Result<Image<f32, 1>, Box<dyn std::error::Error>> {
    let mut frame = Image::from_size_fn([width, height].into(), |x, y, _| {
        let (x, y) = (x as f32 - shift.0, y as f32 - shift.1);
        0.5 + 0.2 * (0.35 * x).sin() * (0.27 * y).cos()
            + 0.12 * (0.21 * (x + y)).sin()
            + 0.08 * (0.11 * x - 0.07 * y).cos()
    })?;

    if noise > 0.0 {
        // uniform noise with the requested standard deviation
        let half_range = noise * 3.0f32.sqrt();
        for v in frame.as_slice_mut() {
            *v = (*v + rng.random_range(-half_range..half_range)).clamp(0.0, 1.0);
        }
    }

    Ok(frame)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config: TrackingConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => TrackingConfig::default(),
    };

    let context = TrackingContext::new(config)?;
    log::info!("{context}");

    let mut tracker = KltTracker::with_context(context, args.num_features);
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);

    let mut prev = render_frame(args.width, args.height, (0.0, 0.0), args.noise, &mut rng)?;
    let selected = tracker.select_good_features(&prev)?;
    println!("Frame 0: selected {selected} features");

    for i in 1..args.num_frames {
        let shift = (args.dx * i as f32, args.dy * i as f32);
        let frame = render_frame(args.width, args.height, shift, args.noise, &mut rng)?;

        let tracked = tracker.track_features(&prev, &frame)?;
        let replaced = tracker.replace_lost_features(&frame)?;
        println!("Frame {i}: tracked {tracked} features, replaced {replaced}");

        let lost: Vec<String> = tracker
            .features()
            .iter()
            .filter(|f| !f.is_tracked())
            .map(|f| f.status().to_string())
            .collect();
        log::debug!("frame {i}: lost status codes {lost:?}");

        prev = frame;
    }

    if let Some(path) = args.output {
        let records = tracker.features().to_records();
        std::fs::write(&path, serde_json::to_string_pretty(&records)?)?;
        println!("Wrote {} feature records to {}", records.len(), path.display());
    }

    Ok(())
}

use anyhow::Context;
use sonicweave::{Backend, Device, DeviceDesc, LoopMode, SonicWeaveEvent, Sound};
use std::time::Duration;

const RATE: u32 = 44100;
const BEAT: f64 = 0.2;

/// One note of `beats` length with a short attack and release.
fn note(frequency: f64, beats: f64, square: bool) -> anyhow::Result<Sound> {
    let length = beats * BEAT;
    let tone = Sound::sine(frequency, RATE)?;
    let tone = if square { tone.square().volume(0.3)? } else { tone };
    Ok(tone
        .limit(0.0, length)?
        .fadein(0.0, 0.005)?
        .fadeout(length - 0.02, 0.02)?)
}

fn phrase(notes: &[(f64, f64)], square: bool) -> anyhow::Result<Sound> {
    let mut notes = notes.iter();
    let &(frequency, beats) = notes.next().context("empty phrase")?;
    let mut sound = note(frequency, beats, square)?;
    for &(frequency, beats) in notes {
        sound = sound.join(&note(frequency, beats, square)?)?;
    }
    Ok(sound)
}

/// Plays a short two-voice tune, then exercises pause/resume/seek on it.
///
/// Pass `--null` to run without audio hardware.
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let backend = if std::env::args().any(|a| a == "--null") {
        Backend::Null
    } else {
        Backend::default()
    };

    let melody = phrase(
        &[
            (659.25, 2.0),
            (493.88, 1.0),
            (523.25, 1.0),
            (587.33, 2.0),
            (523.25, 1.0),
            (493.88, 1.0),
            (440.00, 2.0),
            (440.00, 1.0),
            (523.25, 1.0),
            (659.25, 2.0),
        ],
        false,
    )?;
    // Render the filtered bass once; both loop passes read the same samples.
    let bass = phrase(&[(164.81, 4.0), (220.00, 4.0), (164.81, 6.0)], true)?
        .lowpass(800.0, 0.707)?
        .buffer()?;
    let tune = melody.mix(&bass)?.looped(LoopMode::Count(2));

    println!(
        "Tune: {:.2} s at {} Hz",
        tune.duration().unwrap_or_default(),
        tune.sample_rate()
    );

    let device = Device::open(DeviceDesc::new().backend(backend).sample_rate(48000))
        .context("opening output device")?;
    println!(
        "Device: {} Hz, {} channels, {:?}",
        device.sample_rate(),
        device.channels(),
        device.format()
    );

    let handle = device.play(&tune)?;
    std::thread::sleep(Duration::from_secs(2));

    println!("Pause");
    handle.pause();
    std::thread::sleep(Duration::from_millis(500));

    println!("Resume at {:.2} s", handle.position());
    handle.resume();
    handle.set_volume(0.6)?;
    std::thread::sleep(Duration::from_secs(1));

    println!("Seek back to the start");
    handle.seek(0.0)?;

    while !handle.is_terminal() {
        for event in device.poll_events() {
            match event {
                SonicWeaveEvent::StreamError { error } => eprintln!("stream error: {}", error),
                event => println!("{:?}", event),
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("✓ Finished in state {:?}", handle.state());
    Ok(())
}

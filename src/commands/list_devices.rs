//! List capture sources: monitors, windows, cameras and audio inputs.

use console::style;

use crate::platform::{self, cpal_audio};

/// Prints every source `fluxrec record` can use, with the ids its flags expect.
///
/// A backend that is unavailable in this build is reported and skipped.
///
/// # Errors
/// - If the audio host cannot be initialized
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    let screen = platform::default_screen();

    section("Monitors (--monitor)");
    match screen.list_monitors() {
        Ok(monitors) if monitors.is_empty() => println!("  none found"),
        Ok(monitors) => {
            for (index, rect) in monitors.iter().enumerate() {
                println!("  {index}: {rect}");
            }
        }
        Err(e) => println!("  {}", style(e).dim()),
    }

    section("Windows (--window)");
    match screen.list_windows() {
        Ok(windows) if windows.is_empty() => println!("  none found"),
        Ok(windows) => {
            for (id, title) in windows {
                println!("  {id}: {title}");
            }
        }
        Err(e) => println!("  {}", style(e).dim()),
    }

    section("Cameras (webcam_device)");
    match platform::default_camera() {
        None => println!("  {}", style("webcam support not built in").dim()),
        Some(camera) => match camera.list_devices() {
            Ok(devices) if devices.is_empty() => println!("  none found"),
            Ok(devices) => {
                for (id, name) in devices {
                    println!("  {id}: {name}");
                }
            }
            Err(e) => println!("  {}", style(e).dim()),
        },
    }

    section("Audio inputs ([audio] device)");
    let inputs = cpal_audio::list_input_devices()?;
    if inputs.is_empty() {
        println!("  none found");
    }
    for input in inputs {
        let default_indicator = if input.is_default { " [DEFAULT]" } else { "" };
        let format = match input.default_format {
            Some(format) => format!("{}Hz, {} channels", format.sample_rate, format.channels),
            None => "configuration unavailable".to_string(),
        };
        println!("  {}: {}{} ({})", input.index, input.name, default_indicator, format);
    }
    println!();
    Ok(())
}

fn section(title: &str) {
    println!();
    println!("{}", style(title).bold());
}

use std::path::PathBuf;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use meetingLight::config::Settings;
use meetingLight::models::light::Rgb;
use meetingLight::models::status::MeetingStatus;
use meetingLight::runtime;
use meetingLight::service::status_service::classify;
use meetingLight::tasks::observer::next_meeting_line;

const TEST_LIGHT_COLOR: Rgb = Rgb::new(0, 255, 128);

#[derive(Parser)]
#[command(name = "meetingLight", about = "Signal upcoming meetings on a Govee light")]
pub struct Cli {
    /// Dotenv-style config file; overrides CONFIG_FILE.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum Commands {
    /// Poll the calendar and drive the light until Ctrl-C.
    Run {
        /// Send status updates to the log instead of stdout.
        #[arg(long)]
        log_only: bool,
    },
    /// Set the light to green to check the device connection.
    TestLight,
    /// Turn the light off.
    Off,
    /// Probe the device API with a device listing.
    Health,
    /// List devices on the Govee account.
    Devices,
    /// Show the next meeting and its status without touching the light.
    Next,
}

pub async fn cli(command: Commands, settings: Settings) -> anyhow::Result<()> {
    match command {
        Commands::Run { log_only } => runtime::run(settings, log_only).await,
        Commands::TestLight => {
            let mut light = runtime::build_light_service(&settings)?;
            if !light.set_color(TEST_LIGHT_COLOR).await {
                bail!("failed to set test color {}", TEST_LIGHT_COLOR);
            }
            println!("Light set to {}", TEST_LIGHT_COLOR);
            Ok(())
        }
        Commands::Off => {
            let mut light = runtime::build_light_service(&settings)?;
            if !light.turn_off().await {
                bail!("failed to turn the light off");
            }
            println!("Light turned off");
            Ok(())
        }
        Commands::Health => {
            let mut light = runtime::build_light_service(&settings)?;
            if !light.perform_health_check().await {
                bail!("device API health check failed");
            }
            println!("Device API is healthy");
            Ok(())
        }
        Commands::Devices => {
            let light = runtime::build_light_service(&settings)?;
            let devices = light.list_devices().await?;
            if devices.is_empty() {
                println!("No devices found on this account");
            }
            for device in devices {
                println!(
                    "{} ({}) model={} controllable={} commands={}",
                    device.name,
                    device.device,
                    device.model,
                    device.controllable,
                    device.support_cmds.join(",")
                );
            }
            Ok(())
        }
        Commands::Next => {
            let calendar = runtime::build_calendar_service(&settings)?;
            let now = Utc::now();
            let Some(event) = calendar.next_event(now).await else {
                println!("{}", MeetingStatus::NoEvents);
                return Ok(());
            };
            let Some((start, end)) = event.time_range() else {
                bail!("event '{}' has no usable start/end time", event.title);
            };
            let status = classify(now, start, end, &settings.loop_settings.thresholds);
            println!("{}: {}", event.title, status);
            println!("{}", next_meeting_line(start, &settings.display_timezone));
            Ok(())
        }
    }
}

mod bridge;
mod command;
mod error;
mod host;
mod ipc;

pub use error::Error;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use log::debug;

use bridge::{Bridge, Reply};
use host::battery::Battery;
use host::sysfs::SysfsBattery;
use ipc::Ipc;

#[derive(Parser)]
#[command(about = "Battery bridge for the host power supply")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the battery level once
    Level,

    /// Print the full battery record once
    Info,

    /// Invoke a bridge operation by its wire name
    Call {
        name: String,

        /// Query a running server instead of reading the host directly
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Keep re-reading the battery record on an interval
    Watch {
        /// Seconds between reads
        #[arg(long, default_value_t = 10)]
        every: u64,
    },

    /// Answer bridge calls over a unix socket
    Serve {
        #[arg(long, default_value = "/tmp/voltio.sock")]
        socket: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Args::parse();
    let bridge = Bridge::new();

    match args.command {
        Cmd::Level => print_reply(bridge.call("getBatteryLevel").await),
        Cmd::Info  => print_reply(bridge.call("getBatteryInfo").await),
        Cmd::Call { name, socket } => {
            let reply = match socket {
                Some(socket) => Ipc::query(socket, &command::Call::new(name)).await?,
                None         => bridge.call(&name).await,
            };

            print_reply(reply)
        }
        Cmd::Watch { every } => {
            let probe = SysfsBattery::default();
            let mut readings = probe.battery_stream(Duration::from_secs(every.max(1))).await?;

            while let Some(info) = readings.next().await {
                println!("Battery Level: {}% ({}, {})", info.level, info.source, info.health);
            }

            Ok(())
        }
        Cmd::Serve { socket } => {
            let _ = fs::remove_file(&socket);

            let ipc = Ipc::bind(&socket, bridge)?;

            debug!("Listening on {}", socket.display());

            ipc.listen().await.map_err(Into::into)
        }
    }
}

fn print_reply(reply: Reply) -> Result<(), Error> {
    match reply {
        Reply::Level(level) => {
            println!("Battery Level: {level}%");
            Ok(())
        }
        Reply::Info(info) => {
            println!("Battery Level: {}%", info.level);
            println!("Charging:      {}", if info.is_charging { "yes" } else { "no" });
            println!("Source:        {}", info.source);
            println!("Health:        {}", info.health);
            println!("Temperature:   {:.1} C", info.temperature);
            println!("Voltage:       {} mV", info.voltage_millivolts);
            Ok(())
        }
        Reply::Unavailable(reason)  => Err(Error::Unavailable(reason)),
        Reply::NotImplemented(name) => Err(Error::NotImplemented(name)),
    }
}

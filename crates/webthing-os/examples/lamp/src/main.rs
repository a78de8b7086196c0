use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use tracing::info;

use tracing_subscriber::filter::LevelFilter;

use webthing::action::{ActionInputSchema, ActionSchema};
use webthing::error::Error;
use webthing::event::Event;
use webthing::property::Property;
use webthing::schema::DataSchema;
use webthing::thing::Thing;
use webthing::thing_set::ThingSet;
use webthing::value::{PropertyValue, Value};

use webthing_os::config::ServerConfig;
use webthing_os::error::Result;
use webthing_os::server::Server;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "webthing.toml")]
    config: PathBuf,

    /// Server port, overriding the configuration.
    #[arg(short, long)]
    port: Option<u16>,
}

fn lamp() -> webthing::error::Result<Thing> {
    let mut thing = Thing::new("urn:dev:ops:my-lamp-1234", "My Lamp")
        .types(["OnOffSwitch", "Light"])
        .description("A web connected lamp");

    thing.add_property(Property::new(
        "on",
        Value::with_setter(true, |on| {
            info!("On-State is now {on:?}");
            Ok(())
        }),
        DataSchema::boolean()
            .at_type("OnOffProperty")
            .title("On/Off")
            .description("Whether the lamp is turned on"),
    ))?;

    thing.add_property(Property::new(
        "brightness",
        Value::with_setter(50, |brightness| {
            info!("Brightness is now {brightness:?}");
            Ok(())
        }),
        DataSchema::integer_with_limits(0, 100)
            .at_type("BrightnessProperty")
            .title("Brightness")
            .description("The level of light from 0-100")
            .unit("percent"),
    ))?;

    thing.add_available_action(
        "fade",
        ActionSchema::new()
            .title("Fade")
            .description("Fade the lamp to a given level")
            .input(
                ActionInputSchema::new()
                    .required_property(
                        "brightness",
                        DataSchema::integer_with_limits(0, 100).unit("percent"),
                    )
                    .required_property(
                        "duration",
                        DataSchema::integer_at_least(1).unit("milliseconds"),
                    ),
            ),
        |thing: &Thing, action| {
            let input = action.input();
            let (Some(brightness), Some(PropertyValue::Integer(duration))) =
                (input.get("brightness"), input.get("duration"))
            else {
                return Err(Error::validation("`brightness` and `duration` are required"));
            };

            std::thread::sleep(Duration::from_millis(duration.unsigned_abs()));
            thing.set_property("brightness", brightness.clone())?;
            thing.add_event(Event::new("overheated", Some(PropertyValue::Integer(102))))
        },
    )?;

    thing.add_available_event(
        "overheated",
        DataSchema::number()
            .description("The lamp has exceeded its safe operating temperature")
            .unit("degree celsius"),
    )?;

    Ok(thing)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let mut config = ServerConfig::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    Server::from_config(ThingSet::single(lamp()?), &config).serve()
}

use std::f64::consts::TAU;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;

use tracing::warn;

use tracing_subscriber::filter::LevelFilter;

use webthing::action::{ActionInputSchema, ActionSchema};
use webthing::error::Error;
use webthing::event::Event;
use webthing::property::Property;
use webthing::schema::DataSchema;
use webthing::thing::Thing;
use webthing::thing_set::ThingSet;
use webthing::value::{PropertyValue, Value};

use webthing_os::error::Result;
use webthing_os::server::Server;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server port.
    #[arg(short, long, default_value_t = 8888)]
    port: u16,

    /// Seconds between two humidity readings.
    #[arg(short, long, default_value_t = 3)]
    interval: u64,
}

fn lamp() -> webthing::error::Result<Thing> {
    let mut thing = Thing::new("urn:dev:ops:my-lamp-1234", "My Lamp")
        .types(["OnOffSwitch", "Light"])
        .description("A web connected lamp");

    thing.add_property(Property::new(
        "on",
        Value::new(true),
        DataSchema::boolean().at_type("OnOffProperty").title("On/Off"),
    ))?;

    thing.add_property(Property::new(
        "brightness",
        Value::new(50),
        DataSchema::integer_with_limits(0, 100)
            .at_type("BrightnessProperty")
            .title("Brightness")
            .unit("percent"),
    ))?;

    thing.add_available_action(
        "fade",
        ActionSchema::new().title("Fade").input(
            ActionInputSchema::new()
                .required_property("brightness", DataSchema::integer_with_limits(0, 100))
                .required_property("duration", DataSchema::integer_at_least(1)),
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

    thing.add_available_event("overheated", DataSchema::number().unit("degree celsius"))?;

    Ok(thing)
}

fn humidity_sensor(level: Value) -> webthing::error::Result<Thing> {
    let mut thing = Thing::new("urn:dev:ops:my-humidity-sensor-1234", "My Humidity Sensor")
        .types(["MultiLevelSensor"])
        .description("A web connected humidity sensor");

    thing.add_property(Property::new(
        "level",
        level,
        DataSchema::number_with_limits(0.0, 100.0)
            .at_type("LevelProperty")
            .title("Humidity")
            .unit("percent")
            .read_only(),
    ))?;

    Ok(thing)
}

// A fake reading, slowly oscillating between 40% and 60%.
fn read_humidity() -> f64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();
    50.0 + 10.0 * (seconds * TAU / 60.0).sin()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let level = Value::new(read_humidity());
    let sensor = humidity_sensor(level.clone())?;

    let interval = Duration::from_secs(cli.interval);
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(interval);
            if let Err(e) = level.notify_of_external_update(read_humidity()) {
                warn!("Humidity update failed: {e}");
            }
        }
    });

    let things = ThingSet::multiple([lamp()?, sensor], "LightAndTempDevice");

    Server::new(things).port(cli.port).serve()
}

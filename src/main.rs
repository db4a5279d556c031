mod autostart;
mod desktop_entry;
mod impact;
mod sampler;
mod search;
mod settings;
pub mod theme;
mod ui;
mod worker;

use tracing_subscriber::EnvFilter;
use ui::SimplyToast;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    iced::application(SimplyToast::title, SimplyToast::update, SimplyToast::view)
        .subscription(SimplyToast::subscription)
        .theme(SimplyToast::theme)
        .window(iced::window::Settings {
            size: (1100.0, 640.0).into(),
            #[cfg(target_os = "linux")]
            platform_specific: iced::window::settings::PlatformSpecific {
                application_id: String::from("simplytoast"),
                ..Default::default()
            },
            ..Default::default()
        })
        .run_with(SimplyToast::new)
}

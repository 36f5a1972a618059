use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tagwatch::config::{
    detect_in_container, parse_extra_images, EmailSettings, HttpSettings, DEFAULT_SELF_IMAGE,
    DEFAULT_TIMER_MINUTES, HELPER_CONTAINER_NAME,
};
use tagwatch::format::{is_valid_time_format, DEFAULT_TIME_FORMAT};
use tagwatch::{Config, Error, ImageRef, NotifyTarget, RunMode, Storage, WatchPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifyKind {
    None,
    Http,
    Email,
}

/// Every option is also read from the environment variable named next to it.
#[derive(Parser, Debug)]
#[command(name = "tagwatch", version)]
#[command(about = "Watch running containers for newer images on Docker Hub and keep them up to date")]
pub struct Cli {
    /// Minutes between the end of one run and the start of the next (0 = run once)
    #[arg(long, env = "TIMER", default_value_t = DEFAULT_TIMER_MINUTES as f64)]
    pub timer: f64,

    /// Watch every container unless it sets `tagwatch.enable=false`
    #[arg(long, env = "WATCH_ALL", default_value_t = true, action = ArgAction::Set)]
    pub watch_all: bool,

    /// Comma-separated images to watch without a running container
    #[arg(long, env = "EXTRA_IMAGES", default_value = "")]
    pub extra_images: String,

    /// Pull updated images and recreate their containers
    #[arg(long, env = "AUTO_UPDATE", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub auto_update: bool,

    /// Refresh every watched container on the first run
    #[arg(long, env = "UPDATE_ON_START", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub update_on_start: bool,

    /// Let tagwatch update its own container through a helper container
    #[arg(long, env = "AUTO_UPDATE_SELF", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub auto_update_self: bool,

    /// Prune dangling images after a cycle that found container updates
    #[arg(long, env = "PRUNE_IMAGES", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub prune_images: bool,

    /// Prune unused volumes after a cycle that found container updates
    #[arg(long, env = "PRUNE_VOLUMES", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub prune_volumes: bool,

    /// Keep tracked images in memory instead of `<data-dir>/tagwatch.db`
    #[arg(long, env = "DB_MEMORY", default_value_t = true, action = ArgAction::Set)]
    pub db_memory: bool,

    /// Directory for the database and state file
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Timezone for timestamps in reports (IANA name)
    #[arg(long, env = "TZ", default_value = "UTC")]
    pub tz: String,

    /// strftime pattern for timestamps in reports
    #[arg(long, env = "TIME_FORMAT", default_value = DEFAULT_TIME_FORMAT)]
    pub time_format: String,

    /// Where summaries are sent
    #[arg(long, env = "NOTIFY_TYPE", value_enum, default_value_t = NotifyKind::None)]
    pub notify_type: NotifyKind,

    /// Webhook receiving `{"title", "text"}` posts
    #[arg(long, env = "NOTIFY_HTTP_URL")]
    pub notify_http_url: Option<String>,

    /// Title or subject of notifications
    #[arg(long, env = "NOTIFY_SUBJECT", default_value = "tagwatch")]
    pub notify_subject: String,

    #[arg(long, env = "NOTIFY_EMAIL_HOST")]
    pub notify_email_host: Option<String>,

    /// SMTP port; 465 uses implicit TLS, anything else STARTTLS
    #[arg(long, env = "NOTIFY_EMAIL_PORT", default_value_t = 587)]
    pub notify_email_port: u16,

    /// SMTP login, also used as the sender address
    #[arg(long, env = "NOTIFY_EMAIL_USERNAME")]
    pub notify_email_username: Option<String>,

    #[arg(long, env = "NOTIFY_EMAIL_PASSWORD", hide_env_values = true)]
    pub notify_email_password: Option<String>,

    #[arg(long, env = "NOTIFY_EMAIL_FROM_NAME", default_value = "Notify")]
    pub notify_email_from_name: String,

    /// Comma-separated recipients
    #[arg(long, env = "NOTIFY_EMAIL_TO", default_value = "")]
    pub notify_email_to: String,

    /// Repository tagwatch itself is published as
    #[arg(long, env = "SELF_IMAGE", default_value = DEFAULT_SELF_IMAGE)]
    pub self_image: String,

    /// Override detection of running inside a container
    #[arg(long, env = "IN_CONTAINER", action = ArgAction::Set)]
    pub in_container: Option<bool>,

    /// Container hostname, which Docker sets to the container id
    #[arg(long, env = "HOSTNAME", hide = true)]
    pub hostname: Option<String>,

    /// `verbose` logs debug output and the effective configuration
    #[arg(long, env = "LOGS")]
    pub logs: Option<String>,

    /// Same as LOGS=verbose
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false, action = ArgAction::Set,
          num_args = 0..=1, default_missing_value = "true")]
    pub log_json: bool,

    /// Internal: finish a self-update by replacing the given container
    #[arg(long = "update-helper", value_name = "CONTAINER_ID", hide = true)]
    pub update_helper: Option<String>,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
            || self
                .logs
                .as_deref()
                .is_some_and(|logs| logs.eq_ignore_ascii_case("verbose"))
    }

    /// Validate the options and build the run mode and configuration.
    pub fn into_config(self) -> Result<(RunMode, Config), Error> {
        let verbose = self.is_verbose();

        if !self.timer.is_finite() || self.timer < 0.0 {
            return Err(Error::Config(format!(
                "TIMER must be a non-negative number of minutes, got {}",
                self.timer
            )));
        }
        let poll_interval = Duration::try_from_secs_f64(self.timer * 60.0).map_err(|e| {
            Error::Config(format!("TIMER of {} minutes is out of range: {}", self.timer, e))
        })?;
        let timezone = self
            .tz
            .parse::<chrono_tz::Tz>()
            .map_err(|e| Error::Config(format!("Unknown timezone '{}': {}", self.tz, e)))?;
        if !is_valid_time_format(&self.time_format) {
            return Err(Error::Config(format!(
                "TIME_FORMAT '{}' is not a valid strftime pattern",
                self.time_format
            )));
        }

        let notify = match self.notify_type {
            NotifyKind::None => NotifyTarget::None,
            NotifyKind::Http => NotifyTarget::Http(HttpSettings {
                url: self.notify_http_url,
                subject: self.notify_subject,
            }),
            NotifyKind::Email => NotifyTarget::Email(EmailSettings {
                host: self.notify_email_host,
                port: self.notify_email_port,
                username: self.notify_email_username,
                password: self.notify_email_password,
                from_name: self.notify_email_from_name,
                to: split_list(&self.notify_email_to),
                subject: self.notify_subject,
            }),
        };

        let in_container = self.in_container.unwrap_or_else(detect_in_container);
        let storage = if self.db_memory {
            Storage::Memory
        } else {
            Storage::Disk(self.data_dir)
        };

        let mode = match self.update_helper {
            Some(original_container_id) => RunMode::Helper {
                original_container_id,
            },
            None => RunMode::Normal,
        };

        let config = Config {
            poll_interval,
            watch_policy: WatchPolicy::from_watch_all(self.watch_all),
            extra_images: parse_extra_images(&self.extra_images),
            auto_update: self.auto_update,
            update_on_start: self.update_on_start,
            auto_update_self: self.auto_update_self,
            prune_images: self.prune_images,
            prune_volumes: self.prune_volumes,
            self_image: ImageRef::parse(&self.self_image).image,
            helper_name: HELPER_CONTAINER_NAME.to_string(),
            in_container,
            own_container: if in_container { self.hostname } else { None },
            storage,
            notify,
            timezone,
            time_format: self.time_format,
            verbose,
        };
        Ok((mode, config))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["tagwatch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn helper_flag_selects_helper_mode() {
        let (mode, _) = parse(&["--update-helper", "abc123", "--tz", "UTC"])
            .into_config()
            .unwrap();
        assert_eq!(
            mode,
            RunMode::Helper {
                original_container_id: "abc123".to_string()
            }
        );
    }

    #[test]
    fn bare_switches_enable_features() {
        let (_, config) = parse(&["--auto-update", "--prune-images", "--tz", "UTC"])
            .into_config()
            .unwrap();
        assert!(config.auto_update);
        assert!(config.prune_images);
        assert!(config.downloads_enabled());
    }

    #[test]
    fn zero_timer_runs_once() {
        let (_, config) = parse(&["--timer", "0", "--tz", "UTC"]).into_config().unwrap();
        assert!(config.run_once());
    }

    #[test]
    fn fractional_timer_minutes() {
        let (_, config) = parse(&["--timer", "0.5", "--tz", "UTC"]).into_config().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn negative_timer_is_rejected() {
        let err = parse(&["--timer=-1", "--tz", "UTC"]).into_config().unwrap_err();
        assert!(err.to_string().contains("TIMER"));
    }

    #[test]
    fn huge_timer_is_rejected() {
        let err = parse(&["--timer", "1e18", "--tz", "UTC"])
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("TIMER"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(parse(&["--tz", "Mars/Olympus"]).into_config().is_err());
    }

    #[test]
    fn email_recipients_are_split() {
        let (_, config) = parse(&[
            "--tz",
            "UTC",
            "--notify-type",
            "email",
            "--notify-email-to",
            "a@example.com, b@example.com",
        ])
        .into_config()
        .unwrap();
        match config.notify {
            NotifyTarget::Email(settings) => {
                assert_eq!(settings.to, vec!["a@example.com", "b@example.com"]);
            }
            other => panic!("expected email target, got {:?}", other),
        }
    }

    #[test]
    fn watch_all_false_switches_to_opt_in() {
        let (_, config) = parse(&["--watch-all", "false", "--tz", "UTC"])
            .into_config()
            .unwrap();
        assert_eq!(config.watch_policy, WatchPolicy::OptIn);
    }

    #[test]
    fn disk_storage_uses_data_dir() {
        let (_, config) = parse(&["--db-memory", "false", "--data-dir", "/tmp/tw", "--tz", "UTC"])
            .into_config()
            .unwrap();
        assert_eq!(config.storage, Storage::Disk(PathBuf::from("/tmp/tw")));
    }
}

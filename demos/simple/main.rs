use featureprobe::{Config, User};

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("featureprobe=info"))
        .init();

    let sdk_key = std::env::var("FEATUREPROBE_SDK_KEY").unwrap();
    let remote_url = std::env::var("FEATUREPROBE_URL")
        .unwrap_or_else(|_| Config::DEFAULT_REMOTE_URL.to_owned());

    // Blocks up to start_wait (5 seconds by default) for toggles to be fetched. Until they arrive,
    // the client returns default values.
    let client = Config::new()
        .remote_url(remote_url)
        .to_client(sdk_key)
        .unwrap();

    let user = User::new("test-user").with_attr("city", "4");

    let enabled = client.bool_value("campaign_allow_list", &user, false);
    println!("Value: {:?}", enabled);

    let detail = client.bool_detail("campaign_allow_list", &user, false);
    println!("Detail: {:?}", detail);

    client.track("demo_run", &user, None);

    // Sends pending events before exiting.
    client.close().unwrap();
}

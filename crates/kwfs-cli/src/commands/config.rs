use kwfs_config::KeywordFsConfig;

pub fn run(config: &KeywordFsConfig) -> Result<(), Box<dyn std::error::Error>> {
    let effective = config.effective();

    // Print as YAML for readability
    println!("{}", effective.to_yaml()?);

    for problem in effective.validate() {
        eprintln!("warning: {}", problem);
    }

    Ok(())
}

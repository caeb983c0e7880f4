use transactron::driver;

fn main() -> anyhow::Result<()> {
    driver::run()
}

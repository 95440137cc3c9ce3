fn main() -> anyhow::Result<()> {
    qsweep::run()
}

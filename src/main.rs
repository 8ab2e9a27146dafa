fn main() -> anyhow::Result<()> {
    return_deadlines::cli::run()
}
